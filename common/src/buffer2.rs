use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice;

/// Row-major 2-D plane. `(x, y)` is (column, row).
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn same_shape<U>(&self, other: &Buffer2<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.width;
        &mut self.pixels[start..start + self.width]
    }

    /// Rows top to bottom. A zero-width plane yields nothing.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.pixels.chunks_exact(self.width.max(1)).take(self.height)
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.pixels
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer2<U> {
        Buffer2 {
            pixels: self.pixels.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T: Copy> Buffer2<T> {
    pub fn column(&self, x: usize) -> Vec<T> {
        debug_assert!(x < self.width);
        (0..self.height).map(|y| self.pixels[y * self.width + x]).collect()
    }
}

impl<T: Default + Clone> Buffer2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, T::default())
    }
}

impl<T: Clone> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            pixels: vec![value; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.pixels.fill(value);
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Deref for Buffer2<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl<T> DerefMut for Buffer2<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pixels
    }
}

impl<'a, T> IntoIterator for &'a Buffer2<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.pixels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Buffer2<i32> {
        // row 0 = [10, 20, 30], row 1 = [40, 50, 60]
        Buffer2::new(3, 2, vec![10, 20, 30, 40, 50, 60])
    }

    #[test]
    fn test_new_stores_dimensions() {
        let buf = sample();
        assert_eq!(buf.width(), 3);
        assert_eq!(buf.height(), 2);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    #[should_panic(expected = "pixels length must equal width * height")]
    fn test_new_panics_on_size_mismatch() {
        Buffer2::new(3, 2, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_fn_is_row_major() {
        let buf = Buffer2::from_fn(3, 2, |x, y| (y * 10 + x) as i32);
        assert_eq!(buf.pixels(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(buf[(2, 1)], 12);
    }

    #[test]
    fn test_get_and_index_agree() {
        let buf = sample();
        assert_eq!(*buf.get(0, 1), 40);
        assert_eq!(buf[(2, 0)], 30);
    }

    #[test]
    fn test_row_access() {
        let mut buf = sample();
        assert_eq!(buf.row(1), &[40, 50, 60]);
        buf.row_mut(0).iter_mut().for_each(|v| *v += 1);
        assert_eq!(buf.row(0), &[11, 21, 31]);
        assert_eq!(buf.row(1), &[40, 50, 60], "other rows untouched");
        assert_eq!(buf.rows().count(), 2);
    }

    #[test]
    fn test_column_extracts_values_top_to_bottom() {
        assert_eq!(sample().column(1), vec![20, 50]);
    }

    #[test]
    fn test_map_preserves_shape() {
        let halves = sample().map(|&v| v as f32 / 2.0);
        assert!(halves.same_shape(&sample()));
        assert_eq!(halves[(1, 1)], 25.0);
    }

    #[test]
    fn test_new_filled_and_fill() {
        let mut buf = Buffer2::new_filled(2, 3, 7u16);
        assert!(buf.iter().all(|&v| v == 7));
        buf.fill(0);
        assert_eq!(buf, Buffer2::new_default(2, 3));
    }

    #[test]
    fn test_empty_plane_has_no_rows() {
        let buf: Buffer2<f32> = Buffer2::new_default(0, 0);
        assert!(buf.is_empty());
        assert_eq!(buf.rows().count(), 0);
    }
}
