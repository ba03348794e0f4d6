pub mod request;
pub mod response;
pub mod stream;

pub use request::{ChatMessage, ChatRequest, ChatRequestProbe};
pub use response::{ChatChoice, ChatResponse, ChatUsage};
pub use stream::{ChatChunk, ChunkChoice, ChunkDelta};
