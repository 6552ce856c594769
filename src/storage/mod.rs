pub mod uploads;

pub use uploads::{spawn_sweeper, StoredUpload, UploadStore};
