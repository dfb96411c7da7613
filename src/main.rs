mod cli;

use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use saslink::types::Tables;
use saslink::{SasClient, ServerType, Settings};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_filter = if args.verbose { "saslink=debug" } else { "saslink=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Load config, then fold CLI overrides over it
    let settings = Settings::load();
    let mut config = settings.to_sas_config();
    if let Some(url) = args.server_url.clone() {
        config.server_url = url;
    }
    if let Some(kind) = args.server_type.as_deref() {
        config.server_type =
            ServerType::parse(kind).ok_or_else(|| anyhow!("unknown server type: {}", kind))?;
    }
    if let Some(loc) = args.app_loc.clone() {
        config.app_loc = loc;
    }
    if args.no_debug {
        config.debug = false;
    } else if args.debug {
        config.debug = true;
    }
    if config.server_url.is_empty() {
        bail!("no server URL configured; pass --server-url or set SASLINK_SERVER_URL");
    }

    let client = SasClient::new(config)?;
    let access_token = args
        .access_token
        .clone()
        .or_else(|| settings.get("SASLINK_ACCESS_TOKEN"));

    if args.login {
        let (user, password) = read_credentials(args.user.as_deref())?;
        let status = client.log_in(&user, &password).await?;
        if !status.is_logged_in {
            bail!("sign-in failed");
        }
        println!("signed in as {}", status.user_name.green());
        return Ok(());
    }

    if args.logout {
        client.log_out().await?;
        println!("signed out");
        return Ok(());
    }

    if args.check_session {
        let status = client.check_session().await?;
        if status.is_logged_in {
            println!("signed in as {}", status.user_name.green());
        } else {
            println!("{}", "not signed in".yellow());
        }
        return Ok(());
    }

    if args.list_contexts {
        let contexts = client.get_executable_contexts(access_token.as_deref()).await?;
        if contexts.is_empty() {
            println!("{}", "no executable contexts".yellow());
        }
        for context in contexts {
            println!("{}  {}", context.id, context.name.green());
        }
        return Ok(());
    }

    if let Some(path) = args.exec.as_deref() {
        let code = std::fs::read_to_string(path)?;
        let lines: Vec<String> = code.lines().map(|l| l.to_string()).collect();
        match client.config().server_type {
            ServerType::SasViya => {
                let file_name = Path::new(path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "program".to_string());
                let result = client
                    .execute_script(
                        &file_name,
                        &lines,
                        &args.context,
                        access_token.as_deref(),
                        None,
                        false,
                    )
                    .await?
                    .ok_or_else(|| anyhow!("execution context not found: {}", args.context))?;
                println!("{}", result.job_status.green());
                print_log_value(&result.log);
            }
            ServerType::Sas9 => {
                let log = client
                    .execute_script_sas9(&lines, &args.server_name, &args.repository)
                    .await?;
                println!("{}", log);
            }
        }
        return Ok(());
    }

    // Default mode: submit a program
    let program = match args.program.clone() {
        Some(p) => p,
        None => bail!("provide a program to run, or one of --login/--logout/--check-session/--list-contexts/--exec"),
    };
    let data = match args.data.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let tables: Tables = serde_json::from_str(&text)
                .map_err(|e| anyhow!("{} is not a JSON object of tables: {}", path, e))?;
            Some(tables)
        }
        None => None,
    };
    let mut params = serde_json::Map::new();
    for pair in &args.param {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--param takes KEY=VALUE, got: {}", pair))?;
        params.insert(key.to_string(), Value::String(value.to_string()));
    }
    let params = if params.is_empty() { None } else { Some(params) };

    let (need_tx, need_rx) = tokio::sync::oneshot::channel();
    let request = client.request_with_callback(
        &program,
        data.as_ref(),
        params.as_ref(),
        move |needed| {
            let _ = need_tx.send(needed);
        },
    );
    tokio::pin!(request);

    // A parked request settles once log_in replays it
    let payload = tokio::select! {
        result = &mut request => result?,
        _ = need_rx => {
            eprintln!("{}", "sign-in required".yellow());
            let (user, password) = read_credentials(args.user.as_deref())?;
            let status = client.log_in(&user, &password).await?;
            if !status.is_logged_in {
                bail!("sign-in failed");
            }
            request.await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    if args.show_log {
        if let Some(entry) = client.requests().into_iter().next() {
            if let Some(log) = entry.log_file {
                eprintln!("{}", log.dimmed());
            }
        }
    }
    Ok(())
}

/// Username from the flag or an interactive prompt; password from the
/// terminal, or from stdin when piped.
fn read_credentials(user: Option<&str>) -> Result<(String, String)> {
    let stdin_is_tty = io::stdin().is_terminal();
    let user = match user {
        Some(u) => u.to_string(),
        None => {
            if !stdin_is_tty {
                bail!("sign-in required; pass --user and pipe the password on stdin");
            }
            prompt_line("Username: ")?
        }
    };
    let password = if stdin_is_tty {
        prompt_line("Password: ")?
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf.trim_end_matches(['\r', '\n']).to_string()
    };
    if password.is_empty() {
        bail!("empty password");
    }
    Ok((user, password))
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_log_value(log: &Value) {
    match log {
        Value::Null => {}
        Value::String(text) => eprintln!("{}", text.dimmed()),
        other => {
            if let Ok(text) = serde_json::to_string_pretty(other) {
                eprintln!("{}", text.dimmed());
            }
        }
    }
}
