use gatehouse_core::models::BindingScope;
use serde::Serialize;

/// Initialize tracing for the CLI. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gatehouse=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Binding scope from the `--org` / `--team` flags. A team wins over an
/// organization; neither means global.
pub fn scope_from_args(organization_id: Option<i64>, team_id: Option<i64>) -> BindingScope {
    match (organization_id, team_id) {
        (_, Some(team_id)) => BindingScope::Team(team_id),
        (Some(organization_id), None) => BindingScope::Organization(organization_id),
        (None, None) => BindingScope::Global,
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
