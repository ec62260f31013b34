pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod services;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use config::Config;
use middleware::auth::{require_session, TokenKeys};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub keys: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let keys = Arc::new(TokenKeys::from_config(&config));
        Self { db, config: Arc::new(config), keys }
    }
}

/// Cookies travel cross-origin, so origins are listed explicitly.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::SET_COOKIE, header::CONTENT_DISPOSITION])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::list(allowed))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signin", post(routes::auth::sign_in))
        .route("/verify-tokens", get(routes::auth::verify_tokens))
        .route("/posts", get(routes::posts::list_posts))
        .route("/posts/{id}", get(routes::posts::get_post))
}

fn guarded_routes() -> Router<AppState> {
    use routes::{committees, dashboard, families, members, posts, projects, subjects};

    Router::new()
        .route("/logout", get(routes::auth::logout))
        // Posts
        .route("/create-post", post(posts::create_post))
        .route("/update-post/{id}", put(posts::update_post))
        .route("/delete-post/{id}", delete(posts::delete_post))
        // Committees
        .route("/create-committee", post(committees::create_committee))
        .route("/committees", get(committees::list_committees))
        .route("/committees/{id}", delete(committees::delete_committee))
        .route("/committee/orphans", post(committees::committee_orphans))
        .route("/committee/families", post(committees::committee_families))
        .route("/add-member", post(committees::add_member))
        // Members
        .route("/edit-member/{id}", post(members::edit_member))
        .route("/get-committee-teachers", post(members::committee_teachers))
        .route("/members/{id}", delete(members::delete_member))
        // Projects
        .route("/create-project", post(projects::create_project))
        .route("/projects", get(projects::list_projects))
        .route("/projects/stats", get(projects::project_stats))
        .route("/projects/export", post(projects::export_projects))
        .route("/projects/{id}", get(projects::project_detail).put(projects::update_project))
        .route("/projects/{id}/beneficiaries", get(projects::project_beneficiaries))
        .route("/beneficiaries/orphans", get(projects::orphan_options))
        .route("/beneficiaries/families", get(projects::family_options))
        // Families and children
        .route("/create-family", post(families::create_family))
        .route("/update-family", put(families::update_family))
        .route("/get-three-families", get(families::three_families))
        .route("/get-family-data", post(families::family_data))
        .route("/get-families-of-page", post(families::families_of_page))
        .route("/get-four-children", get(families::four_children))
        .route("/get-children-of-page", post(families::children_of_page))
        .route("/search-children", post(families::search_children))
        .route("/get-family-update-data", post(families::family_update_data))
        .route("/get-child-data", post(families::child_data))
        .route("/child-data-update", post(families::child_with_grades))
        .route("/update-child", put(families::update_child))
        .route("/get-all-children-data", post(families::children_by_level))
        .route("/get-all-widows", get(families::all_widows))
        // Subjects
        .route("/create-subject", post(subjects::create_subject))
        .route("/update-subject", post(subjects::update_subject))
        .route("/get-all-subjects", post(subjects::all_subjects))
        .route("/create-class", post(subjects::create_class))
        .route("/get-subject-data", post(subjects::subject_data))
        .route("/get-subject-students", post(subjects::subject_students))
        .route("/get-class-data", post(subjects::class_data))
        .route("/add-remark", post(subjects::add_remark))
        .route("/get-subject-remarks", post(subjects::subject_remarks))
        .route("/edit-class", post(subjects::edit_class))
        .route("/get-class-absence", post(subjects::class_absence))
        .route("/update-absence", post(subjects::update_absence))
        .route("/get-subject-classes", post(subjects::subject_classes))
        .route("/delete-remark", post(subjects::delete_remark))
        .route("/delete-subject", post(subjects::delete_subject))
        .route("/delete-class", post(subjects::delete_class))
        .route("/export-subjects", post(subjects::export_subjects))
        // Dashboard
        .route("/get-statistics", get(dashboard::statistics))
}

pub fn build_router(state: AppState) -> Router {
    let guarded = guarded_routes().route_layer(from_fn_with_state(state.keys.clone(), require_session));
    let api = public_routes().merge(guarded);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        // Post images arrive as multipart, avatars as inline data URIs.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
