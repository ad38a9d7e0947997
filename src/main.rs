use std::sync::Arc;

use clap::Parser;
use vision_stream::camera::FrameSource;
use vision_stream::cli::{handle_config_action, Args, Command};
use vision_stream::config::Config;
use vision_stream::overlay::{InferenceClient, Overlay};
use vision_stream::recording::Recorder;
use vision_stream::server;
use vision_stream::stream::StreamCoordinator;

type BoxError = Box<dyn std::error::Error>;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before anything else; a missing file is fine
    let _ = dotenv::dotenv();
    init_logging();

    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    args.apply_to(&mut config);

    if let Some(Command::Config { action }) = &args.command {
        if let Err(e) = handle_config_action(action.clone(), args.config.as_deref(), &config) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), BoxError> {
    let source = FrameSource::open(&config.camera.settings())?;
    let recorder = Arc::new(Recorder::new(config.recording.clone()));
    let mut coordinator = StreamCoordinator::new(source, recorder, config.stream.clone());

    if config.overlay.enabled {
        let client = InferenceClient::new(&config.overlay)?;
        log::info!("Inference overlay enabled ({})", client.address());
        let overlay: Arc<dyn Overlay> = Arc::new(client);
        coordinator = coordinator.with_overlay(overlay);
    }
    let coordinator = Arc::new(coordinator);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let served = runtime.block_on(server::serve(
        Arc::clone(&coordinator),
        &config.server,
        config.recording.dir.clone(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        },
    ));
    drop(runtime);

    // Blocking teardown runs outside the runtime
    coordinator.shutdown();
    served?;
    Ok(())
}
