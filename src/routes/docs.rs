use actix_files::NamedFile;
use actix_web::HttpResponse;

use crate::error::AppError;

pub const OPENAPI_PATH: &str = "./api/openapi.yaml";

/// Swagger UI loads its assets from unpkg, so this page gets its own CSP
const DOCS_CSP: &str = "default-src 'none'; script-src 'unsafe-inline' https://unpkg.com; \
    style-src 'unsafe-inline' https://unpkg.com; img-src 'self' data: https://unpkg.com; \
    connect-src 'self'; frame-ancestors 'none'";

const DOCS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Blog API - Interactive Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css" />
    <style>
        body { margin: 0; background: #fafafa; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.yaml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                layout: "StandaloneLayout",
                validatorUrl: null,
                tryItOutEnabled: true
            });
        };
    </script>
</body>
</html>"#;

/// GET /openapi.yaml, GET /openapi.json
///
/// Both paths serve the YAML document.
pub async fn openapi_spec() -> Result<NamedFile, AppError> {
    NamedFile::open_async(OPENAPI_PATH).await.map_err(|e| {
        tracing::warn!(path = OPENAPI_PATH, error = %e, "API description not available");
        AppError::NotFound("API description not available".to_string())
    })
}

/// GET /docs, GET /api-docs
pub async fn openapi_docs() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .insert_header(("Content-Security-Policy", DOCS_CSP))
        .body(DOCS_HTML)
}
