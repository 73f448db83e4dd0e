//! Deckhand CLI - a dashboard for remote coding agents.

use clap::Parser;
use std::process;

use deckhand::agent_service::CloudClient;
use deckhand::cli::{
    AgentCommands, Cli, Commands, ConfigCommands, DraftCommands, GridCommands, PrCommands,
};
use deckhand::commands::{self, Output};
use deckhand::store::Store;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let result = run_command(cli.command, human);

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!(
                "{}",
                serde_json::json!({ "error": e.to_string() })
            );
        }
        process::exit(1);
    }
}

/// Open the store and build a service client for commands that talk to the
/// agent service.
fn service_client(store: &Store) -> Result<CloudClient, deckhand::Error> {
    let api_key = commands::require_api_key(store)?;
    Ok(CloudClient::new(api_key))
}

fn run_command(command: Commands, human: bool) -> Result<(), deckhand::Error> {
    let store = Store::open()?;

    match command {
        Commands::Launch {
            prompt,
            repo,
            git_ref,
            model,
            branch,
            auto_pr,
            images,
        } => {
            let service = service_client(&store)?;
            let images = commands::load_images(&images)?;
            let result = commands::launch(
                store,
                &service,
                commands::LaunchArgs {
                    repository: repo,
                    git_ref,
                    pr_url: None,
                    prompt,
                    model,
                    branch,
                    auto_create_pr: auto_pr,
                    images,
                },
            )?;
            output(&result, human);
        }

        Commands::Review { pr_url, model } => {
            let service = service_client(&store)?;
            let result = commands::review(store, &service, &pr_url, model)?;
            output(&result, human);
        }

        Commands::Agent { command } => run_agent_command(store, command, human)?,

        Commands::Grid { command } => match command {
            GridCommands::Show => output(&commands::grid_show(&store)?, human),
            GridCommands::Add { id } => output(&commands::grid_add(store, &id)?, human),
            GridCommands::Rm { id } => output(&commands::grid_rm(store, &id)?, human),
        },

        Commands::Repos { refresh } => {
            let service = service_client(&store)?;
            output(&commands::repos(&store, &service, refresh)?, human);
        }

        Commands::Branches { repo, refresh } => {
            output(&commands::branches(&store, &repo, refresh)?, human);
        }

        Commands::Models => {
            let service = service_client(&store)?;
            output(&commands::models(&service)?, human);
        }

        Commands::Pr { command } => match command {
            PrCommands::Status { url } => output(&commands::pr_status(&store, &url)?, human),
            PrCommands::Merge { url, method } => {
                output(&commands::pr_merge(&store, &url, method.as_deref())?, human)
            }
            PrCommands::Reviewers { url, reviewers } => {
                output(&commands::pr_reviewers(&store, &url, reviewers)?, human)
            }
        },

        Commands::Reviews => output(&commands::reviews(&store)?, human),

        Commands::Draft { command } => match command {
            DraftCommands::Get { id } => output(&commands::draft_get(&store, &id)?, human),
            DraftCommands::Set { id, text } => {
                output(&commands::draft_set(&store, &id, &text)?, human)
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Set { key, value } => {
                let key = commands::ConfigKey::parse(&key)?;
                output(&commands::config_set(&store, key, &value)?, human);
            }
            ConfigCommands::Get => output(&commands::config_get(&store)?, human),
            ConfigCommands::Clear { key } => {
                let key = commands::ConfigKey::parse(&key)?;
                output(&commands::config_clear(&store, key)?, human);
            }
            ConfigCommands::Test => {
                let service = match store.api_key() {
                    Some(key) => CloudClient::new(key),
                    // Connectivity test still reports github-token state without a key
                    None => CloudClient::new(String::new()),
                };
                output(&commands::config_test(&store, &service)?, human);
            }
        },

        #[cfg(feature = "tui")]
        Commands::Tui => {
            let service = service_client(&store)?;
            deckhand::tui::run(store, service)?;
        }
    }

    Ok(())
}

fn run_agent_command(
    store: Store,
    command: AgentCommands,
    human: bool,
) -> Result<(), deckhand::Error> {
    let service = service_client(&store)?;

    match command {
        AgentCommands::List => output(&commands::agent_list(&service)?, human),
        AgentCommands::Show { id } => output(&commands::agent_show(&service, &id)?, human),
        AgentCommands::Stop { id } => output(&commands::agent_stop(&service, &id)?, human),
        AgentCommands::Delete { id } => {
            output(&commands::agent_delete(store, &service, &id)?, human)
        }
        AgentCommands::FollowUp { id, message, images } => {
            let images = commands::load_images(&images)?;
            output(
                &commands::follow_up(&store, &service, &id, &message, images)?,
                human,
            )
        }
        AgentCommands::Conversation { id } => {
            output(&commands::conversation(&service, &id)?, human)
        }
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
