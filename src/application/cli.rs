#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::collections::HashMap;
use std::io;
use std::path;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::ContextRef;
use crate::domain::models::PromptTemplate;

/// What `main` should run once the command line has been handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    Chat {
        prompt: String,
        context_refs: Vec<ContextRef>,
    },
    Replay {
        events_file: String,
    },
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

/// Parses repeated `key=value` flags.
pub fn parse_fields(fields: &[String]) -> Result<HashMap<String, String>> {
    let mut res = HashMap::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| return anyhow!("Field '{field}' must be formatted as key=value"))?;

        if key.trim().is_empty() {
            bail!("Field '{field}' has an empty key");
        }
        res.insert(key.trim().to_string(), value.to_string());
    }

    return Ok(res);
}

async fn render_template(matches: &ArgMatches) -> Result<String> {
    let file = matches
        .get_one::<String>("file")
        .ok_or_else(|| return anyhow!("A template file is required"))?;

    let fields = matches
        .get_many::<String>("field")
        .map(|fields| return fields.cloned().collect::<Vec<String>>())
        .unwrap_or_default();

    let template = PromptTemplate::from_toml(&fs::read_to_string(file).await?)?;
    let rendered = template.render(&parse_fields(&fields)?)?;
    return Ok(rendered);
}

fn chat_mode(matches: &ArgMatches) -> Result<RunMode> {
    let prompt = matches
        .get_one::<String>("prompt")
        .ok_or_else(|| return anyhow!("A prompt is required"))?
        .to_string();

    let context_refs = matches
        .get_many::<String>("ref")
        .map(|refs| {
            return refs
                .map(|text| return ContextRef::parse(text))
                .collect::<Result<Vec<ContextRef>>>();
        })
        .transpose()?
        .unwrap_or_default();

    return Ok(RunMode::Chat {
        prompt,
        context_refs,
    });
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Sends one prompt and prints the streamed response.")
        .arg(
            Arg::new("prompt")
                .help("The message to send.")
                .required(true),
        )
        .arg(
            Arg::new("ref")
                .short('r')
                .long("ref")
                .help("Attach a resource as context, formatted as type:id:hash. Can be repeated.")
                .action(ArgAction::Append),
        );
}

fn subcommand_replay() -> Command {
    return Command::new("replay")
        .about("Feeds a recorded NDJSON event log through the chat pipeline and prints the result.")
        .arg(
            Arg::new("file")
                .help("Path to the recorded event log.")
                .required(true),
        );
}

fn subcommand_template() -> Command {
    return Command::new("template")
        .about("Renders a prompt template file.")
        .arg(
            Arg::new("file")
                .help("Path to a TOML prompt template.")
                .required(true),
        )
        .arg(
            Arg::new("field")
                .short('f')
                .long("field")
                .help("A template field, formatted as key=value. Can be repeated.")
                .action(ArgAction::Append),
        );
}

fn arg_backend() -> Arg {
    return Arg::new(ConfigKey::Backend.to_string())
        .short('b')
        .long(ConfigKey::Backend.to_string())
        .env("STUDYMATE_BACKEND")
        .num_args(1)
        .help(format!(
            "The backend hosting the study assistant. [default: {}]",
            Config::default(ConfigKey::Backend)
        ))
        .value_parser(PossibleValuesParser::new(BackendName::VARIANTS))
        .global(true);
}

fn arg_backend_health_check_timeout() -> Arg {
    return Arg::new(ConfigKey::BackendHealthCheckTimeout.to_string())
        .long(ConfigKey::BackendHealthCheckTimeout.to_string())
        .env("STUDYMATE_BACKEND_HEALTH_CHECK_TIMEOUT")
        .num_args(1)
        .help(
            format!("Time to wait in milliseconds before timing out when doing a healthcheck for a backend. [default: {}]", Config::default(ConfigKey::BackendHealthCheckTimeout)),
        )
        .global(true);
}

fn arg_bridge_url() -> Arg {
    return Arg::new(ConfigKey::BridgeURL.to_string())
        .long(ConfigKey::BridgeURL.to_string())
        .env("STUDYMATE_BRIDGE_URL")
        .num_args(1)
        .help(format!(
            "URL of the native bridge when using the bridge backend. [default: {}]",
            Config::default(ConfigKey::BridgeURL)
        ))
        .global(true);
}

fn arg_events_file() -> Arg {
    return Arg::new(ConfigKey::EventsFile.to_string())
        .long(ConfigKey::EventsFile.to_string())
        .env("STUDYMATE_EVENTS_FILE")
        .num_args(1)
        .help("Recorded NDJSON event log streamed by the replay backend.")
        .global(true);
}

fn arg_history_max_entries() -> Arg {
    return Arg::new(ConfigKey::HistoryMaxEntries.to_string())
        .long(ConfigKey::HistoryMaxEntries.to_string())
        .env("STUDYMATE_HISTORY_MAX_ENTRIES")
        .num_args(1)
        .help(format!(
            "Maximum number of entries kept in navigation history. [default: {}]",
            Config::default(ConfigKey::HistoryMaxEntries)
        ))
        .global(true);
}

fn arg_navigation_debounce_ms() -> Arg {
    return Arg::new(ConfigKey::NavigationDebounceMs.to_string())
        .long(ConfigKey::NavigationDebounceMs.to_string())
        .env("STUDYMATE_NAVIGATION_DEBOUNCE_MS")
        .num_args(1)
        .help(format!(
            "Minimum time in milliseconds between back or forward navigations. [default: {}]",
            Config::default(ConfigKey::NavigationDebounceMs)
        ))
        .global(true);
}

fn arg_response_timeout_secs() -> Arg {
    return Arg::new(ConfigKey::ResponseTimeoutSecs.to_string())
        .long(ConfigKey::ResponseTimeoutSecs.to_string())
        .env("STUDYMATE_RESPONSE_TIMEOUT_SECS")
        .num_args(1)
        .help(format!(
            "Seconds to wait for a response before cancelling the stream, 0 waits forever. [default: {}]",
            Config::default(ConfigKey::ResponseTimeoutSecs)
        ))
        .global(true);
}

fn arg_session_id() -> Arg {
    return Arg::new(ConfigKey::SessionID.to_string())
        .long(ConfigKey::SessionID.to_string())
        .env("STUDYMATE_SESSION_ID")
        .num_args(1)
        .help("Session to send messages under. A new one is created when omitted.")
        .global(true);
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("studymate")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_replay())
        .subcommand(subcommand_template())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .arg(arg_backend())
        .arg(arg_backend_health_check_timeout())
        .arg(arg_bridge_url())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("STUDYMATE_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(arg_events_file())
        .arg(arg_history_max_entries())
        .arg(arg_navigation_debounce_ms())
        .arg(arg_response_timeout_secs())
        .arg(arg_session_id());
}

/// Turns parsed arguments into a run mode. One-shot subcommands do their work
/// here and return `None`.
pub async fn handle(matches: ArgMatches) -> Result<Option<RunMode>> {
    match matches.subcommand() {
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;

            return Ok(Some(chat_mode(subcmd_matches)?));
        }
        Some(("replay", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;

            let events_file = subcmd_matches
                .get_one::<String>("file")
                .ok_or_else(|| return anyhow!("An events file is required"))?
                .to_string();

            return Ok(Some(RunMode::Replay { events_file }));
        }
        Some(("template", subcmd_matches)) => {
            println!("{}", render_template(subcmd_matches).await?);
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        _ => {
            build().print_long_help()?;
        }
    }

    return Ok(None);
}

pub async fn parse() -> Result<Option<RunMode>> {
    return handle(build().get_matches()).await;
}
