use std::env;

use chrono::Utc;
use evlog::{meta, LogEventConsolePrinter, Logger};
use itertools::Itertools;

use clubpoll::db::{model, DBClient};
use clubpoll::engine::resolve::{self, ResolutionOutcome};
use clubpoll::runtime::{get_logger, set_logger};

/// Poll state is derived lazily from the clock, so there is no scheduler;
/// this binary is the sweep an operator (or a cron entry) runs to resolve
/// every poll whose close time has passed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let db_url = env::var("CLUBPOLL_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://clubpoll.db".to_owned());

    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    set_logger(logger);

    let db = DBClient::new(&db_url).await?;

    let now = Utc::now();
    let due = model::list_closed_unresolved(db.conn(), now).await?;

    if due.is_empty() {
        println!("No polls are awaiting resolution.");
        return Ok(());
    }

    for poll in &due {
        let labels = poll.options.iter().map(|o| o.label.as_str()).join(", ");
        println!("Resolving poll {} '{}' [{}]", poll.id, poll.title, labels);

        match resolve::resolve_if_closed_at(db.conn(), poll.id, now).await {
            Ok(ResolutionOutcome::NotYetClosed { closes_at }) => {
                println!("  not yet closed (closes at {})", closes_at);
            }
            Ok(ResolutionOutcome::Resolved(r)) => match r.winning_option_id {
                Some(winner) => {
                    let label = poll
                        .options
                        .iter()
                        .find(|o| o.id == winner)
                        .map(|o| o.label.as_str())
                        .unwrap_or("?");
                    match r.tournament_id {
                        Some(tid) => println!(
                            "  winner: option {} '{}'; tournament {} provisioned",
                            winner, label, tid
                        ),
                        None => println!("  winner: option {} '{}'", winner, label),
                    }
                }
                None => println!("  closed with no votes; no winner"),
            },
            Err(e) => {
                get_logger().error_with_err("Resolution failed; retryable by the next sweep.", &e, meta! {
                    "PollID" => poll.id,
                });
            }
        }
    }

    Ok(())
}
