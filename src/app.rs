use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config;
use crate::data::{MockBackend, Services};
use crate::fetch::ThreadExecutor;
use crate::logging;
use crate::router::Route;
use crate::session::Persistence;
use crate::state::StateContainer;
use crate::storage;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub offline: bool,
    pub initial_route: Option<String>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.logging).context("init logging")?;
    let config_path = options.config_file.clone().or_else(config::default_path);
    tracing::info!(config = %friendly_path(config_path.as_ref()), offline = options.offline, "starting");

    let store = Arc::new(
        storage::Store::open(storage::Options {
            path: cfg.storage.path.clone(),
            in_memory: options.offline,
        })
        .context("open storage")?,
    );
    let persistence = Persistence::new(store.clone());
    let mut container =
        StateContainer::new(persistence, cfg.ui.flash_ttl).context("restore session")?;

    let (services, chat_url, status) = if options.offline {
        let backend = Arc::new(MockBackend::seeded());
        let services = Services::mock(backend, Arc::new(ThreadExecutor));
        (services, None, "offline demo data".to_string())
    } else {
        let client = api::Client::new(api::ClientConfig {
            base_url: Some(cfg.backend.base_url.clone()),
            user_agent: cfg.backend.user_agent.clone(),
            timeout: Some(cfg.backend.timeout),
            http_client: None,
        })
        .context("build backend client")?;
        let services = Services::from_client(Arc::new(client));
        (
            services,
            Some(cfg.backend.chat_endpoint()),
            String::new(),
        )
    };

    container.validate_session(services.auth.clone(), services.executor.as_ref());

    let initial_route = options
        .initial_route
        .as_deref()
        .map(Route::parse)
        .unwrap_or(Route::Home);

    let mut model = ui::Model::new(ui::Options {
        container,
        services,
        initial_route,
        chat_url,
        search_debounce: cfg.ui.search_debounce,
        status_message: status,
    });
    let result = model.run();
    drop(model);

    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => tracing::debug!("storage still shared at exit; leaving it to drop"),
    }
    tracing::info!("bye");
    result
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/complexapp-tui/config.yaml".to_string()
    }
}
