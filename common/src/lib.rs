pub mod buffer2;
pub mod file_format;
pub mod log_setup;
pub mod serde_format;

pub use buffer2::Buffer2;
pub use file_format::{get_file_extension, FileExtensionError, FileFormat, FileFormatResult};
pub use log_setup::{init_test_logging, setup_logging, LogSetupError};
pub use serde_format::{
    deserialize, deserialize_for_path, serialize, SerdeFormatError, SerdeFormatResult,
};
