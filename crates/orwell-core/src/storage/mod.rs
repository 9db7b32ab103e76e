mod digest;
mod session;

pub use digest::{content_hash, log_file_name};
pub use session::{SessionStore, INDEX_FILE_NAME};
