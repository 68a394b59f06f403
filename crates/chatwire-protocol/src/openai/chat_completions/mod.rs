pub mod request;
pub mod response;
pub mod stream;

pub use request::ChatCompletionRequest;
pub use response::{ChatCompletionResponse, ChatCompletionResponseChoice, ResponseMessage};
pub use stream::{
    ChatCompletionChunk, ChatCompletionStreamChoice, ChatCompletionStreamDelta, UpstreamErrorBody,
};
