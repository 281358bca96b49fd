use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ResolvedSettings;
use crate::error::RedirectError;
use crate::identifier::GameIdentifier;
use crate::resolver::{Resolution, Resolver};
use crate::store::SqliteStore;

#[derive(Clone)]
struct AppState {
    settings: Arc<ResolvedSettings>,
}

pub fn build_router(settings: ResolvedSettings) -> Router {
    let state = AppState {
        settings: Arc::new(settings),
    };
    Router::new()
        .route("/", get(redirect))
        .route("/redirect", get(redirect))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: ResolvedSettings) -> Result<()> {
    let bind = settings.bind;
    let app = build_router(settings);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "gameid-redirect listening");
    axum::serve(listener, app)
        .await
        .context("http server terminated")?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

type QueryPairs = Query<Vec<(String, String)>>;

/// `GET /?gameid=GALE01`: redirect to the wiki page for that game.
async fn redirect(
    State(state): State<AppState>,
    query: Result<QueryPairs, QueryRejection>,
) -> Response {
    let gameid = query.ok().and_then(|Query(pairs)| last_gameid(pairs));
    let identifier = match GameIdentifier::parse(gameid.as_deref()) {
        Ok(identifier) => identifier,
        Err(_) => return found(&state.settings.fallback_url),
    };

    let settings = Arc::clone(&state.settings);
    let lookup = identifier.clone();
    let joined = tokio::task::spawn_blocking(move || -> Result<Resolution, RedirectError> {
        let store = SqliteStore::open(&settings.store)?;
        Resolver::new(settings.region_slot).resolve(&store, &lookup)
    })
    .await;

    match joined {
        Ok(Ok(resolution)) => found(&page_location(&state.settings.page_url, &resolution.title)),
        Ok(Err(error)) => {
            warn!(gameid = %identifier, error = %error, "redirect lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "redirect lookup failed").into_response()
        }
        Err(error) => {
            warn!(gameid = %identifier, error = %error, "redirect task aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, "redirect lookup failed").into_response()
        }
    }
}

// Repeated parameters keep the last value.
fn last_gameid(pairs: Vec<(String, String)>) -> Option<String> {
    pairs
        .into_iter()
        .filter(|(key, _)| key == "gameid")
        .map(|(_, value)| value)
        .last()
}

/// Substitute the URL-escaped `title` for `$1` in `template`.
pub fn page_location(template: &str, title: &str) -> String {
    template.replace("$1", &urlencoding::encode(title))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
