use clap::{Parser, Subcommand};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command-line client for the REST gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Discovery endpoint path.
    #[arg(long, default_value = "/_routes")]
    discovery_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List routed paths and their verbs
    Routes {
        /// Only show paths containing this substring
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Invoke a route
    Call {
        /// HTTP verb (GET, POST, PUT, DELETE, PATCH)
        verb: String,
        /// Request path including any query string
        path: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Routes { search } => {
            let mut request = client.get(format!("{base}{}", cli.discovery_path));
            if let Some(search) = search {
                request = request.query(&[("search_string", search)]);
            }
            let res = request.send().await?;
            print_routes(res).await?;
        }
        Commands::Call { verb, path, body } => {
            let method = Method::from_bytes(verb.to_ascii_uppercase().as_bytes())?;
            let mut request = client.request(method, format!("{base}{path}"));
            if let Some(body) = body {
                serde_json::from_str::<Value>(&body)?;
                request = request
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(body);
            }
            let res = request.send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_routes(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }

    let listing: Value = res.json().await?;
    println!("basepath: {}", listing["basepath"].as_str().unwrap_or("/"));
    for entry in listing["paths"].as_array().into_iter().flatten() {
        let methods: Vec<&str> = entry["methods"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        println!(
            "  {:<48} {}",
            entry["path"].as_str().unwrap_or_default(),
            methods.join(", ")
        );
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let is_json = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) if is_json => println!("{}", serde_json::to_string_pretty(&json)?),
        // Streamed JSON arrives as one document per line.
        _ => print!("{text}"),
    }
    Ok(())
}
