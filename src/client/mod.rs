//! Document submission client and its collaborators.

mod encoder;
mod submission;
mod transport;

pub use encoder::{Document, EncodeFn, Encoder, Payload};
pub use submission::{SubmissionClient, INTRODUCE_GOODS_PATH};
pub use transport::{
    HttpTransport, Method, OutboundRequest, Transport, TransportResponse,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
