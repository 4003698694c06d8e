use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use peds_core::{SearchRequest, SearchResponse, SynthesizeRequest, SynthesizeResponse};
use peds_error::PedsError;
use peds_llm::{make_completion_model, CompletionProviderConfig};
use peds_rag::{
    AnswerSynthesizer, MemoryReferenceStore, PgReferenceStore, ReferenceStore, SearchOrchestrator,
    SearchStats,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<SearchOrchestrator>,
    synthesizer: Arc<AnswerSynthesizer>,
    stats: Arc<SearchStats>,
}

#[derive(Debug, Deserialize)]
struct AppConfig {
    server: ServerCfg,
    completion_provider: CompletionCfgYaml,
    reference_store: StoreCfgYaml,
}

#[derive(Debug, Deserialize)]
struct ServerCfg {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct CompletionCfgYaml {
    kind: String,
    api_url: Option<String>,
    api_key_env: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreCfgYaml {
    kind: String, // postgres | memory
    url_env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let cfg: AppConfig = load_config()?;

    // Reference store: managed Postgres in real deployments, in-memory for
    // local development.
    let store: Arc<dyn ReferenceStore> = match cfg.reference_store.kind.as_str() {
        "postgres" => {
            let url_env = cfg
                .reference_store
                .url_env
                .unwrap_or_else(|| "DATABASE_URL".into());
            let pool = sqlx::PgPool::connect(&read_env(&url_env)?).await?;
            info!("PgReferenceStore: connected");
            Arc::new(PgReferenceStore::new(pool))
        }
        "memory" => {
            info!("MemoryReferenceStore: empty in-process corpus");
            Arc::new(MemoryReferenceStore::new())
        }
        other => anyhow::bail!("unsupported reference store kind={}", other),
    };

    // Completion provider. A missing API key is a hard configuration
    // failure at startup, not at request time.
    let completion_cfg = match cfg.completion_provider.kind.as_str() {
        "mistral" => CompletionProviderConfig::Mistral {
            api_url: cfg.completion_provider.api_url,
            api_key: read_env(
                &cfg.completion_provider
                    .api_key_env
                    .unwrap_or_else(|| "MISTRAL_API_KEY".into()),
            )?,
            model: cfg.completion_provider.model,
        },
        "gemini" => CompletionProviderConfig::Gemini {
            api_url: cfg.completion_provider.api_url,
            api_key: read_env(
                &cfg.completion_provider
                    .api_key_env
                    .unwrap_or_else(|| "GEMINI_API_KEY".into()),
            )?,
            model: cfg.completion_provider.model,
        },
        other => anyhow::bail!("unsupported completion provider kind={}", other),
    };
    let model = make_completion_model(completion_cfg).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let stats = Arc::new(SearchStats::default());
    let state = AppState {
        orchestrator: Arc::new(SearchOrchestrator::new(store.clone(), stats.clone())),
        synthesizer: Arc::new(AnswerSynthesizer::new(
            Arc::from(model),
            store,
            stats.clone(),
        )),
        stats,
    };

    let app = Router::new()
        .route("/api/v1/search", post(search))
        .route("/api/v1/synthesize", post(synthesize))
        .route("/api/v1/stats", get(stats_snapshot))
        .route("/api/v1/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    tracing::info!(%addr, "peds-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tower_http=info"))
        .unwrap();
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config() -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string("configs/default.yaml")?;
    let cfg: AppConfig = serde_yaml::from_str(&s)?;
    info!("load_config: {:?}", cfg);
    Ok(cfg)
}

fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env {}", key))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, PedsError> {
    let outcome = state
        .orchestrator
        .search(&req.query, req.limit_or_default())
        .await?;
    Ok(Json(SearchResponse {
        results: outcome.results,
        method: outcome.method,
    }))
}

async fn synthesize(
    State(state): State<AppState>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<Json<SynthesizeResponse>, PedsError> {
    if req.query.trim().is_empty() {
        return Err(PedsError::InvalidInput {
            reason: "query text is required".to_string(),
        });
    }
    if req.search_results.is_empty() {
        return Err(PedsError::InvalidInput {
            reason: "search results are required".to_string(),
        });
    }

    let answer = state
        .synthesizer
        .synthesize(&req.query, &req.search_results)
        .await?;
    Ok(Json(SynthesizeResponse {
        ai_response: answer.text,
        search_results: req.search_results,
    }))
}

async fn stats_snapshot(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.stats.snapshot()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
