use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use chef_ai::integration::{self, IntegrationContext};
use chef_ai::settings::Settings;

mod cli;

#[derive(Parser)]
#[command(name = "chef-ai", version)]
#[command(about = "An AI assistant for Chef infrastructure code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Show what would happen without writing files or running commands")]
    dry_run: bool,

    #[arg(long, global = true, env = integration::TOOL_ENV, help = "Name of the tool chef-ai runs inside")]
    integration_tool: Option<String>,

    #[arg(long, global = true, env = integration::VERSION_ENV, help = "Version of the host tool")]
    integration_version: Option<String>,

    #[arg(long, global = true, env = integration::DESCRIPTION_ENV, help = "Short description of the host tool")]
    integration_description: Option<String>,

    #[arg(long, global = true, env = integration::STRICT_BOUNDARY_ENV, help = "Refuse requests outside the host tool's domain")]
    strict_boundary: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ask a question about Chef")]
    Ask {
        #[arg(help = "The question to ask")]
        question: String,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,
    },

    #[command(about = "Explain a Chef concept or a file")]
    Explain {
        #[arg(help = "A concept, or a path to a file to explain")]
        target: String,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,
    },

    #[command(about = "Generate cookbooks, recipes or other Chef files")]
    Generate {
        #[arg(help = "What to generate")]
        description: String,

        #[arg(short, long, default_value = ".", help = "Directory to write the generated files into")]
        output: PathBuf,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,

        #[arg(short, long, help = "Create the files without asking")]
        yes: bool,
    },

    #[command(about = "Suggest a knife/chef command and optionally run it")]
    Command {
        #[arg(help = "What the command should do")]
        description: String,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,
    },

    #[command(about = "Diagnose a Chef problem")]
    Troubleshoot {
        #[arg(help = "Description of the problem")]
        problem: String,

        #[arg(long, help = "Log file whose last lines are included")]
        log: Option<PathBuf>,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,
    },

    #[command(about = "Migrate Chef code between versions")]
    Migrate {
        #[arg(long = "from", help = "Chef version the code targets today")]
        from_version: String,

        #[arg(long = "to", help = "Chef version to migrate to")]
        to_version: String,

        #[arg(long, conflicts_with = "scan_only", help = "Write migrated files here instead of in place")]
        output: Option<PathBuf>,

        #[arg(long, help = "Report issues without changing any file")]
        scan_only: bool,

        #[arg(default_value = ".", help = "File or directory to migrate")]
        path: PathBuf,

        #[arg(long, help = "Sampling temperature (0.0 - 2.0)")]
        temperature: Option<f32>,

        #[arg(short, long, help = "Apply changes without asking")]
        yes: bool,
    },

    #[command(about = "Configure Azure OpenAI credentials")]
    Setup,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::prelude::*;

    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<cli::Config> {
    let settings_path = Settings::default_path()?;
    let settings = Settings::load(&settings_path)?;

    Ok(cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
        settings,
        integration: IntegrationContext::from_parts(
            cli.integration_tool.clone(),
            cli.integration_version.clone(),
            cli.integration_description.clone(),
            cli.strict_boundary,
        ),
    })
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ask { question, temperature } => {
            cli::ask(&question, temperature, &config)?;
        }
        Commands::Explain { target, temperature } => {
            cli::explain(&target, temperature, &config)?;
        }
        Commands::Generate {
            description,
            output,
            temperature,
            yes,
        } => {
            cli::generate(&description, &output, yes, temperature, &config)?;
        }
        Commands::Command {
            description,
            temperature,
        } => {
            cli::command(&description, temperature, &config)?;
        }
        Commands::Troubleshoot {
            problem,
            log,
            temperature,
        } => {
            cli::troubleshoot(&problem, log.as_deref(), temperature, &config)?;
        }
        Commands::Migrate {
            from_version,
            to_version,
            output,
            scan_only,
            path,
            temperature,
            yes,
        } => {
            cli::migrate(
                &path,
                &from_version,
                &to_version,
                output.as_deref(),
                scan_only,
                yes,
                temperature,
                &config,
            )?;
        }
        Commands::Setup => {
            cli::setup(&config)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let verbose = cli.verbose;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if verbose {
                eprintln!("\u{001b}[31mError: {:?}\u{001b}[0m", e);
            } else {
                eprintln!("\u{001b}[31mError: {:#}\u{001b}[0m", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_integration_args_read_the_integration_env() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(OsStr::to_os_string)
        };
        assert_eq!(env_of("integration_tool").as_deref(), Some(OsStr::new(integration::TOOL_ENV)));
        assert_eq!(env_of("integration_version").as_deref(), Some(OsStr::new(integration::VERSION_ENV)));
        assert_eq!(
            env_of("integration_description").as_deref(),
            Some(OsStr::new(integration::DESCRIPTION_ENV))
        );
        assert_eq!(
            env_of("strict_boundary").as_deref(),
            Some(OsStr::new(integration::STRICT_BOUNDARY_ENV))
        );
    }
}
