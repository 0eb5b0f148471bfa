/// Use cases outside authentication

mod posts;
mod profile;

pub use posts::{CreatePostRequest, PostService};
pub use profile::ProfileService;
