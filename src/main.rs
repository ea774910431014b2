use anyhow::{Context, Result};
use desktop_container::{
    ContainerConfig, ContainerRuntime, DesktopController, DockerRuntime, Region, Settings,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(argh::FromArgs)]
/// drive a desktop container through robotgo-cli
struct Arguments {
    #[argh(option, short = 'p')]
    /// container profile (TOML, YAML or JSON)
    profile: PathBuf,

    #[argh(option, default = "0")]
    /// seconds to wait after start before acting
    settle: u64,

    #[argh(subcommand)]
    command: Subcommand,
}

#[derive(argh::FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Screenshot(ScreenshotArgs),
    Info(InfoArgs),
    Type(TypeArgs),
    Click(ClickArgs),
    Move(MoveArgs),
    Stop(StopArgs),
}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "screenshot")]
/// capture the screen and write it as PNG
struct ScreenshotArgs {
    #[argh(option, short = 'o', default = r#"PathBuf::from("screenshot.png")"#)]
    /// output file
    output: PathBuf,

    #[argh(option)]
    /// region as X,Y,W,H; the whole screen when omitted
    region: Option<RegionArg>,
}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "info")]
/// print screen size, active window title and processes
struct InfoArgs {}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "type")]
/// type text
struct TypeArgs {
    #[argh(option, short = 't')]
    /// text to type
    text: String,
}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "click")]
/// click a mouse button
struct ClickArgs {
    #[argh(option, short = 'b', default = r#"String::from("left")"#)]
    /// left, right or middle
    button: String,

    #[argh(switch)]
    /// double click
    double: bool,
}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "move")]
/// move the mouse
struct MoveArgs {
    #[argh(option)]
    /// x coordinate
    x: f64,

    #[argh(option)]
    /// y coordinate
    y: f64,
}

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "stop")]
/// stop the profile's container if it is running
struct StopArgs {}

struct RegionArg(Region);

impl argh::FromArgValue for RegionArg {
    fn from_arg_value(value: &str) -> Result<Self, String> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Invalid region {}: {}", value, e))?;

        match parts.as_slice() {
            [x, y, width, height] => Ok(RegionArg(Region {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            })),
            _ => Err(format!("Region must be X,Y,W,H, got: {}", value)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args: Arguments = argh::from_env();

    let settings = Settings::from_env().context("Failed to load settings")?;
    let config = ContainerConfig::from_file(&args.profile)
        .with_context(|| format!("Failed to load profile {}", args.profile.display()))?;

    info!(
        "Profile loaded: {} ({})",
        config.container_name, config.image
    );

    if let Subcommand::Stop(_) = args.command {
        return stop_container(&config, &settings).await;
    }

    let settle = Duration::from_secs(args.settle);
    let controller = DesktopController::connect(config, settings)
        .await
        .context("Failed to connect to Docker")?;

    controller
        .session(move |desk| {
            Box::pin(async move {
                if !settle.is_zero() {
                    info!("Waiting {}s for the desktop to settle", settle.as_secs());
                    tokio::time::sleep(settle).await;
                }

                match args.command {
                    Subcommand::Screenshot(screenshot) => {
                        let (region, full) = match screenshot.region {
                            Some(RegionArg(region)) => (region, false),
                            None => (Region::default(), true),
                        };
                        let png = desk.screen_capture_png(region, full).await?;
                        tokio::fs::write(&screenshot.output, &png).await?;
                        info!(
                            "Screenshot saved to {} ({} bytes)",
                            screenshot.output.display(),
                            png.len()
                        );
                    }
                    Subcommand::Info(_) => {
                        println!("Runtime: {}", desk.runtime_info().await?);
                        println!("Screen size: {}", desk.screen_size().await?);
                        println!("Active window: {}", desk.window_title().await?);
                        println!("{}", desk.process_list().await?);
                    }
                    Subcommand::Type(typing) => {
                        desk.keyboard_type(&typing.text).await?;
                    }
                    Subcommand::Click(click) => {
                        desk.mouse_click(&click.button, click.double).await?;
                    }
                    Subcommand::Move(movement) => {
                        desk.mouse_move([movement.x, movement.y]).await?;
                    }
                    Subcommand::Stop(_) => {}
                }
                Ok(())
            })
        })
        .await?;

    Ok(())
}

async fn stop_container(config: &ContainerConfig, settings: &Settings) -> Result<()> {
    let runtime = DockerRuntime::new(settings)
        .await
        .context("Failed to connect to Docker")?;

    let Some(handle) = runtime.find_container(&config.container_name).await? else {
        info!("Container '{}' does not exist", config.container_name);
        return Ok(());
    };

    if !runtime.container_status(&handle.id).await?.is_running() {
        info!("Container {} is not running", handle);
        return Ok(());
    }

    runtime.stop_container(&handle.id).await?;
    if settings.remove_on_stop {
        runtime.remove_container(&handle.id).await?;
    }
    info!("Container {} stopped", handle);
    Ok(())
}
