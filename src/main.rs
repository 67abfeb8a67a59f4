use iboost_buddy::buddy_component::{BuddyComponent, ControlCommand};
use iboost_buddy::config::BuddyConfig;
use iboost_buddy::home_assistant::HomeAssistantAPI;
use iboost_buddy::home_assistant_publisher::{
    channel_sinks, HomeAssistantPublisher, PUBLISH_QUEUE_CAPACITY,
};
use iboost_buddy::paper_display::{LogSurface, PaperDisplay};
use iboost_buddy::publish_adapter::PublishAdapter;
use iboost_buddy::radio_link::{RadioLink, UdpRadioBridge};
use iboost_buddy::time_source::{SystemClock, TimeSource};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, Sender};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting iBoost Buddy bridge");
    let config = BuddyConfig::from_env()?;
    config.log_summary();

    let (radio, _) = UdpRadioBridge::bind(config.radio_bind).await?;

    // Home Assistant writes run in their own task so a slow server never stalls a tick
    let (updates_tx, updates_rx) = mpsc::channel(PUBLISH_QUEUE_CAPACITY);
    let sinks = channel_sinks(&config.slot_entities, updates_tx);
    HomeAssistantPublisher::new(&config.slot_entities, updates_rx, HomeAssistantAPI::new()).spawn();

    let clock: Option<Box<dyn TimeSource>> = if config.use_system_clock {
        Some(Box::new(SystemClock))
    } else {
        None
    };

    let mut display = PaperDisplay::new(config.display_top_title.clone(), LogSurface);
    display.setup();

    let radio: Box<dyn RadioLink> = Box::new(radio);
    let mut component = BuddyComponent::new(
        Some(radio),
        clock,
        PublishAdapter::new(config.totals_source),
        sinks,
    );
    component.setup();

    let (commands_tx, commands_rx) = mpsc::channel(8);
    tokio::spawn(read_commands(commands_tx));

    component.run(config.poll_interval, commands_rx).await;
    Ok(())
}

/// Reads `boost <minutes>` / `cancel` lines from stdin
async fn read_commands(commands: Sender<ControlCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<ControlCommand>() {
                Ok(command) => {
                    if commands.send(command).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{e}"),
            },
            Ok(None) => {
                info!("Command input closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read command input: {e}");
                return;
            }
        }
    }
}
