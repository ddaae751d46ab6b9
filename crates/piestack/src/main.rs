use anyhow::{Context, Result};
use clap::Parser;
use piestack::app::{App, AppMsg};
use piestack::config;
use piestack::events::AppEvent;
use piestack::scene::Scene;
use piestack::sys::runtime;
use piestack::url_sync::UrlSync;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Builds 3D pie and donut chart scenes as JSON")]
struct Args {
    /// Query string applied over the config, e.g. "n=3&v0=2&x1=true"
    #[arg(long, default_value = "")]
    query: String,

    /// Keep running: reload on config changes, read `click <i>` or query lines from stdin,
    /// and print a scene whenever the chart comes to rest
    #[arg(long)]
    watch: bool,

    /// Include triangulated meshes in the output
    #[arg(long)]
    meshes: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,

    /// Write the default config file, print its path and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.write_config {
        let path = config::write_default_config().context("Failed to write default config")?;
        println!("{}", path.display());
        return Ok(());
    }

    let config = config::load_or_default();
    let mut app = App::new(&config, UrlSync::new(&args.query, false));
    if args.meshes {
        app = app.with_meshes(config.mesh.segments_per_turn);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(app, &args))
}

fn print(scene: &Scene, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(scene)?
    } else {
        serde_json::to_string(scene)?
    };
    println!("{json}");
    Ok(())
}

async fn run(mut app: App, args: &Args) -> Result<()> {
    app.start()?;
    app.first_frame().await?;
    let dt = app.frame_seconds();

    if !args.watch {
        let scene = app.frame(dt)?.context("No outlines resolved")?;
        return print(&scene, args.pretty);
    }

    let (tx, rx) = async_channel::bounded(32);
    runtime::start_background_services(tx.clone());

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(event) = AppEvent::parse_command(&line)
                && tx.send(event).await.is_err()
            {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt));
    let mut dirty = true;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if let Err(e) = app.update(AppMsg::from(event)) {
                        log::error!("Ignored update: {}", e);
                    }
                    dirty = true;
                }
                Err(_) => break,
            },
            _ = ticker.tick() => {
                if let Some(scene) = app.frame(dt)?
                    && dirty
                    && !scene.stale
                    && !app.is_animating()
                {
                    print(&scene, args.pretty)?;
                    dirty = false;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
