//! `scour research` — run one session and print the result.

use scour_config::ScourConfig;
use scour_core::{cancel_pair, ResearchRequest, ResearchResult};
use tracing::info;

pub async fn run(
    config: ScourConfig,
    question: String,
    budget: Option<u64>,
    max_steps: Option<u32>,
    no_direct_answer: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = super::build_controller(&config)?;

    let mut request = ResearchRequest::new(question);
    request.token_budget = budget.unwrap_or(config.research.token_budget);
    request.max_steps = max_steps.unwrap_or(config.research.max_steps);
    request.max_duration_ms = config.research.max_duration_ms;
    request.max_bad_attempts = config.research.max_bad_attempts;
    request.no_direct_answer = no_direct_answer;

    // Ctrl-C cancels the session cooperatively.
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel("interrupted by user");
        }
    });

    let result = controller.research(request, token).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text(&result);
    }
    Ok(())
}

fn print_text(result: &ResearchResult) {
    println!("{}", result.answer);
    if !result.references.is_empty() {
        println!("\nReferences:");
        for r in &result.references {
            if r.exact_quote.is_empty() {
                println!("  - {}", r.url);
            } else {
                println!("  - {} — \"{}\"", r.url, r.exact_quote);
            }
        }
    }
    if result.is_best {
        println!("\n(note: evaluation budget exhausted; this is the best answer found)");
    }
    info!(
        steps = result.metrics.total_steps,
        tokens = result.metrics.tokens_used,
        duration_ms = result.metrics.duration_ms,
        visited = result.visited_urls.len(),
        "session finished"
    );
}
