use actix_web::dev::Server;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{
    AuthService, InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshTokenStore, TokenCodec,
};
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::{cors, JwtMiddleware};
use crate::routes::{
    activate_user, create_post, deactivate_user, delete_post, delete_profile, get_current_user,
    get_post, get_profile, health_check, list_posts, login, logout, logout_all, openapi_docs,
    openapi_spec, password_strength, publish_post, refresh, register, unpublish_post,
    update_post, update_profile,
};
use crate::security::{ClientIpResolver, RateLimitConfig, RateLimiterManager, SecurityHeaders};
use crate::services::{PostService, ProfileService};
use crate::store::{
    InMemoryPostStore, InMemoryUserStore, PgPostStore, PgUserStore, PostStore, UserStore,
};

const MAX_JSON_BODY_BYTES: usize = 64 * 1024;

/// The persistence backends the services run on
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            posts: Arc::new(PgPostStore::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserStore::new()),
            posts: Arc::new(InMemoryPostStore::new()),
            refresh_tokens: Arc::new(InMemoryRefreshTokenStore::new()),
        }
    }
}

fn security_headers() -> DefaultHeaders {
    SecurityHeaders::get_headers()
        .into_iter()
        .fold(DefaultHeaders::new(), |headers, header| headers.add(header))
}

pub fn run(listener: TcpListener, stores: Stores, settings: &Settings) -> Result<Server, std::io::Error> {
    let codec = TokenCodec::new(&settings.jwt);

    let auth = web::Data::new(AuthService::new(
        stores.users.clone(),
        stores.refresh_tokens.clone(),
        codec.clone(),
        settings.password.policy(),
        settings.password.bcrypt_cost,
    ));
    let profiles = web::Data::new(ProfileService::new(
        stores.users.clone(),
        stores.posts.clone(),
        stores.refresh_tokens.clone(),
    ));
    let posts = web::Data::new(PostService::new(stores.posts.clone(), stores.users.clone()));
    let limiter = web::Data::new(RateLimiterManager::new(RateLimitConfig {
        requests_per_minute: settings.security.login_attempts_per_minute,
    }));
    let resolver = web::Data::new(ClientIpResolver::new(
        settings.security.trusted_proxies.clone(),
    ));

    let allowed_origins = settings.security.allowed_origins.clone();

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(MAX_JSON_BODY_BYTES)
            .error_handler(|err, _req| {
                tracing::info!(error = %err, "Rejected request body");
                AppError::Validation(ValidationError::InvalidFormat("request body".to_string()))
                    .into()
            });

        App::new()
            // Global middleware
            .wrap(security_headers())
            .wrap(LoggerMiddleware)
            .wrap(cors(&allowed_origins))

            // Shared state
            .app_data(json_config)
            .app_data(auth.clone())
            .app_data(profiles.clone())
            .app_data(posts.clone())
            .app_data(limiter.clone())
            .app_data(resolver.clone())

            // API description
            .route("/openapi.yaml", web::get().to(openapi_spec))
            .route("/openapi.json", web::get().to(openapi_spec))
            .route("/docs", web::get().to(openapi_docs))
            .route("/api-docs", web::get().to(openapi_docs))
            .service(
                web::scope("/api/v1")
                    // Public routes
                    .route("/health", web::get().to(health_check))
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(register))
                            .route("/login", web::post().to(login))
                            .route("/refresh", web::post().to(refresh))
                            .route("/password-strength", web::post().to(password_strength)),
                    )
                    // Protected routes
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(get_current_user)),
                    )
                    .service(
                        web::scope("/users")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route("/profile", web::get().to(get_profile))
                            .route("/profile", web::put().to(update_profile))
                            .route("/profile", web::delete().to(delete_profile))
                            .route("/logout", web::post().to(logout))
                            .route("/logout-all", web::post().to(logout_all))
                            .route("/{id}/activate", web::put().to(activate_user))
                            .route("/{id}/deactivate", web::put().to(deactivate_user)),
                    )
                    .service(
                        web::scope("/posts")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route("", web::post().to(create_post))
                            .route("", web::get().to(list_posts))
                            .route("/{id}", web::get().to(get_post))
                            .route("/{id}", web::put().to(update_post))
                            .route("/{id}", web::delete().to(delete_post))
                            .route("/{id}/publish", web::put().to(publish_post))
                            .route("/{id}/unpublish", web::put().to(unpublish_post)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
