pub mod model;

pub use model::{CompletionJob, ConversionJob};
