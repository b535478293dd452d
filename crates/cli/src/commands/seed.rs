use serde_json::json;

use freightgate_core::config::{AppConfig, LoadOptions};
use freightgate_db::{connect, migrations, seed_demo_data, SeedResult};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = seed_demo_data(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<SeedResult, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with_details(
            "seed",
            render_summary(&seeded),
            json!({
                "approvers": seeded.approvers,
                "sessions": seeded.sessions,
                "orders": seeded.orders,
            }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn render_summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded: {} approvers, {} sessions, {} orders",
        seeded.approvers, seeded.sessions, seeded.orders
    )
}

#[cfg(test)]
mod tests {
    use freightgate_db::SeedResult;

    use super::render_summary;

    #[test]
    fn summary_counts_every_fixture_kind() {
        let summary = render_summary(&SeedResult { approvers: 8, sessions: 9, orders: 1 });
        assert_eq!(summary, "demo dataset loaded: 8 approvers, 9 sessions, 1 orders");
    }
}
