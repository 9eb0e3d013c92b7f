use clap::Parser;
use pubsub_connector::{
    publish_method, Component, ConnectedComponent, ConnectedProps, ConnectorOptions, Error,
    MountScope, Props, PubSub, PubSubConfig, PubSubConnector, PubSubError, PubSubProvider,
    PubSubResult, PublishMapping, SubscriptionMapping, Transformer, Value,
};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const TALK: &str = "TALK";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// A line of the conversation, as `owner=text`
    #[arg(short, long = "say", value_parser = parse_line)]
    lines: Vec<(String, String)>,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

fn parse_line(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((owner, text)) if !owner.is_empty() => Ok((owner.to_string(), text.to_string())),
        _ => Err(format!("expected `owner=text`, got '{}'", s)),
    }
}

/// Types a line and publishes it through its `talk` method on render.
struct ConnectedUser {
    owner: String,
    pending: Option<String>,
}

impl ConnectedUser {
    fn say(&mut self, text: &str) {
        self.pending = Some(text.to_string());
    }
}

impl Component for ConnectedUser {
    type Output = PubSubResult<()>;

    fn display_name(&self) -> String {
        "ConnectedUser".to_string()
    }

    fn render(&mut self, props: &ConnectedProps) -> Self::Output {
        let Some(msg) = self.pending.take() else {
            return Ok(());
        };
        let talk = props
            .method("talk")
            .ok_or_else(|| PubSubError::listener(TALK, "talk is not mapped"))?;
        talk.call(&[Value::map([
            ("msg", msg.as_str()),
            ("owner", self.owner.as_str()),
        ])])
    }
}

/// Appends every received `lastMessage` to its transcript.
#[derive(Default)]
struct Conversation {
    transcript: Vec<String>,
}

impl Component for Conversation {
    type Output = String;

    fn display_name(&self) -> String {
        "Conversation".to_string()
    }

    fn render(&mut self, props: &ConnectedProps) -> Self::Output {
        if let Some(line) = props.value("lastMessage").and_then(Value::as_str) {
            self.transcript.push(line.to_string());
        }
        self.transcript.join("\n")
    }
}

fn conversation_connector(config: &PubSubConfig) -> PubSubResult<PubSubConnector> {
    let subscriptions = SubscriptionMapping::from_entries([(
        TALK,
        Transformer::new(|args| {
            let details = args.first().and_then(Value::as_map);
            let field = |key: &str| {
                details
                    .and_then(|d| d.get(key))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Ok(Props::from([(
                "lastMessage".to_string(),
                Value::from(format!("[{}]: {}", field("owner"), field("msg"))),
            )]))
        }),
    )]);
    PubSubConnector::from_config(Some(subscriptions), None, config)
}

fn user_connector() -> PubSubResult<PubSubConnector> {
    let publish = PublishMapping::methods([(
        "talk",
        publish_method(|publisher, args| publisher.publish(TALK, args)),
    )]);
    PubSubConnector::new(
        None,
        Some(publish),
        ConnectorOptions {
            with_ref: true,
            ..Default::default()
        },
    )
}

fn run(cli: &Cli) -> Result<String, Error> {
    let config = if cli.config.exists() {
        PubSubConfig::from_file(&cli.config)?
    } else {
        PubSubConfig::default()
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let provider = PubSubProvider::new(PubSub::with_config(&config));
    let scope = MountScope::with_provider(&provider);

    let mut conversation =
        conversation_connector(&config)?.mount(Conversation::default(), Props::new(), scope)?;
    let mut transcript = conversation.render();

    let users = user_connector()?;
    let mut mounted: BTreeMap<String, ConnectedComponent<ConnectedUser>> = BTreeMap::new();

    for (owner, text) in &cli.lines {
        if !mounted.contains_key(owner) {
            let user = ConnectedUser {
                owner: owner.clone(),
                pending: None,
            };
            let props = Props::from([("owner".to_string(), Value::from(owner.as_str()))]);
            mounted.insert(owner.clone(), users.mount(user, props, scope)?);
        }
        let Some(user) = mounted.get_mut(owner) else {
            return Err(Error::internal(format!("user '{}' was not mounted", owner)));
        };

        user.wrapped_instance_mut()?.say(text);
        user.render()?;

        if let Some(next) = conversation.render_if_needed() {
            transcript = next;
        }
    }

    for (owner, mut user) in mounted {
        debug!("unmounting {}", owner);
        user.unmount()?;
    }
    conversation.unmount()?;

    Ok(transcript)
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(transcript) => println!("{}", transcript),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
