use actix_web::{web, App, HttpServer, middleware::Compress};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use photoscreen::auth::{InMemAuth, TokenIssuer};
use photoscreen::config::AppConfig;
use photoscreen::kv::FileKv;
use photoscreen::openapi::ApiDoc;
use photoscreen::routes::{config, AppState};
use photoscreen::storage::FsImageStore;
use photoscreen::store::PostStore;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment itself.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping photoscreen");
    info!("Data dir: {}", cfg.data_dir.display());
    info!("Persistence: {:?}, ids: {:?}", cfg.store.persist, cfg.store.ids);

    let kv = Arc::new(FileKv::new(cfg.data_dir.join("kv")));
    let store = PostStore::init(kv, cfg.store).await;
    let auth = Arc::new(InMemAuth::new(TokenIssuer::new(cfg.jwt_secret.clone())));
    let image_store = Arc::new(FsImageStore::new(&cfg.data_dir));
    let state = AppState { store: store.clone(), auth, image_store };

    let openapi = ApiDoc::openapi();
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // Expo web / local dev
                .allowed_origin("http://localhost:19006")
                .allowed_origin("http://localhost:8081")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "DELETE", "OPTIONS"])
                .max_age(3600);
            if let Some(front) = &frontend_url {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind.as_str())?;

    info!("Listening on http://{}", cfg.bind);
    server.run().await?;

    // let queued snapshot writes land before exit
    store.dispose().await;
    Ok(())
}
