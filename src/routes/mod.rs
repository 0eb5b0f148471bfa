mod auth;
mod docs;
mod health_check;
mod posts;
mod users;

pub use auth::{get_current_user, login, password_strength, refresh, register};
pub use docs::{openapi_docs, openapi_spec};
pub use health_check::health_check;
pub use posts::{
    create_post, delete_post, get_post, list_posts, publish_post, unpublish_post, update_post,
};
pub use users::{
    activate_user, deactivate_user, delete_profile, get_profile, logout, logout_all,
    update_profile,
};
