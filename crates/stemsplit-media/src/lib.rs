//! Media plumbing for the separation pipeline.
//!
//! Everything a worker needs between "claimed a job" and "stems on disk":
//! fetching the source audio over HTTP, hashing and probing the results,
//! and driving the demucs subprocess that does the actual separation.

pub mod checksum;
pub mod error;
pub mod fetch;
pub mod probe;
pub mod separate;

pub use checksum::sha256_file;
pub use error::{MediaError, MediaResult};
pub use fetch::download_audio;
pub use probe::{probe_audio, AudioInfo};
pub use separate::{DemucsSeparator, SeparatedStem, Separator};
