use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{ChallengeCatalog, ServerConfig};
use crate::routes::{
    autosave_handler, get_challenge_handler, get_challenges_handler, get_project_handler,
    hint_handler, json_error_handler, post_project_handler, publish_project_handler,
    reset_handler, run_handler, submit_handler, validate_project_handler,
};

/// Registers every route of the service; shared between the real server and
/// the test harness.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_challenges_handler)
        .service(get_challenge_handler)
        .service(autosave_handler)
        .service(reset_handler)
        .service(run_handler)
        .service(submit_handler)
        .service(hint_handler)
        .service(post_project_handler)
        .service(get_project_handler)
        .service(validate_project_handler)
        .service(publish_project_handler);
}

pub fn build_server(
    server_config: ServerConfig,
    challenges: Arc<ChallengeCatalog>,
    db_pool: Arc<SqlitePool>,
) -> std::io::Result<Server> {
    let challenges = web::Data::from(challenges);
    let db_pool = web::Data::from(db_pool);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(challenges.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .configure(register_routes)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
