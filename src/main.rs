//! Sketch Loop Desktop Application
//!
//! Loads configuration and the background image, starts the session timers
//! on a tokio runtime and runs the winit event loop on the main thread.

use std::sync::Arc;

use anyhow::{Context, Result};
use sketch_loop::{App, AppWrapper, Config, HttpBackend, ProxySink, Session, SessionEvent};
use winit::event_loop::{ControlFlow, EventLoop};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting sketch loop");

    let config = Config::load()?;
    let app = App::from_config(&config)
        .with_context(|| format!("Failed to load background {:?}", config.canvas.background))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sketch-loop-worker")
        .build()
        .context("Failed to start async runtime")?;

    let event_loop = EventLoop::<SessionEvent>::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let backend = HttpBackend::new(config.endpoints(), config.wire_format())?;
    log::info!("Backend: {}", config.endpoints().predict_url());

    let session = Session::start(
        runtime.handle().clone(),
        Arc::new(backend),
        Arc::new(ProxySink::new(event_loop.create_proxy())),
        config.session_timing(),
    );

    let mut app_wrapper = AppWrapper::new(app, session);
    event_loop.run_app(&mut app_wrapper).context("Event loop error")?;
    let startup_error = app_wrapper.take_startup_error();

    drop(app_wrapper);
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    startup_error.map_or(Ok(()), Err)
}
