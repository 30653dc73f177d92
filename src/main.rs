use post_organizer::error::Result;
use post_organizer::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default).
    // stdout carries protocol messages, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::load()?;

    // Initialize app (bootstraps storage on every activation)
    let app = App::new(&config).await?;

    // --reset wipes everything back to the default categories and exits
    if args.len() >= 2 && args[1] == "--reset" {
        let outcome = app.client().reset_all_data().await?;
        if !outcome.success {
            eprintln!("Reset failed: {}", outcome.error.unwrap_or_default());
        } else {
            println!("Reset categories and categorized posts");
        }
        app.shutdown().await;
        return Ok(());
    }

    // --dump prints the current state as JSON and exits
    if args.len() >= 2 && args[1] == "--dump" {
        let client = app.client();
        let categories = client.get_categories().await?;
        let posts = client.get_categorized_posts().await?;
        let dump = serde_json::json!({
            "categories": categories,
            "categorizedPosts": posts,
        });
        println!("{}", serde_json::to_string_pretty(&dump)?);
        drop(client);
        app.shutdown().await;
        return Ok(());
    }

    // Serve newline-delimited JSON messages on stdin/stdout
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = app.serve(stdin, tokio::io::stdout()).await;

    app.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}
