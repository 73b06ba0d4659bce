mod image_cache_port;
mod image_connection_port;
mod image_decoder_port;
mod image_executor_port;
mod memory_budget_port;

pub use image_cache_port::ImageCachePort;
pub use image_connection_port::{ByteStream, ImageConnection, ImageInput};
pub use image_decoder_port::ImageDecoderPort;
pub use image_executor_port::ImageExecutor;
pub use memory_budget_port::{MemoryBudget, StaticMemoryBudget};

#[cfg(test)]
pub use memory_budget_port::MockMemoryBudget;

#[cfg(test)]
pub mod mocks {
    pub use super::image_connection_port::mock::{MockImageInput, png_bytes};
    pub use super::image_decoder_port::mock::MockDecoder;
}
