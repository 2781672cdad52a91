mod credentials;
mod jsonl;
mod post;

pub use credentials::Credentials;
pub use jsonl::{read_lines, write_lines};
pub use post::{ProjectedPost, SourceKind};
