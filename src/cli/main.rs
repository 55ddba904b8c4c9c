use clap::{Parser, Subcommand};
use natlas_server::search::SearchIndex;
use reqwest::{Client, Response, Url};
use std::error::Error;

#[derive(Parser)]
#[command(name = "natlas-cli")]
#[command(about = "Query and manage natlas scan results", long_about = None)]
struct Cli {
    #[arg(short, long, env = "NATLAS_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search scan output
    Search {
        /// Query string; searches for "nmap" when empty
        #[arg(default_value = "")]
        query: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Index to search: `current` (latest per host) or `history`
        #[arg(long, default_value = "current")]
        index: SearchIndex,
    },

    /// Count hosts with a current scan
    Count,

    /// Show the latest scan of a host
    Host {
        #[arg(value_name = "IP")]
        ip: String,
    },

    /// List past scans of a host
    History {
        #[arg(value_name = "IP")]
        ip: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Show a single scan
    Scan {
        #[arg(value_name = "SCAN_ID")]
        scan_id: String,
    },

    /// List screenshots, for one host or across all hosts
    Screenshots {
        #[arg(long, value_name = "IP")]
        ip: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Show a random live host
    Random,

    /// Delete a single scan
    DeleteScan {
        #[arg(value_name = "SCAN_ID")]
        scan_id: String,
    },

    /// Delete every scan of a host
    DeleteHost {
        #[arg(value_name = "IP")]
        ip: String,
    },

    /// Check server health
    Health,
}

/// Append percent-encoded path segments to the endpoint
fn api_url(endpoint: &Url, segments: &[&str]) -> Result<Url, Box<dyn Error>> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{} cannot be used as a base URL", endpoint))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn print_body(response: Response) -> Result<(), Box<dyn Error>> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        return Err(format!("server responded with {}", status).into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let endpoint = Url::parse(&cli.endpoint)?;
    let url = |segments: &[&str]| api_url(&endpoint, segments);

    let request = match cli.command {
        Commands::Search {
            query,
            limit,
            offset,
            index,
        } => client.get(url(&["search"])?).query(&[
            ("q", query),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("index", index.to_string()),
        ]),

        Commands::Count => client.get(url(&["hosts", "count"])?),

        Commands::Host { ip } => client.get(url(&["hosts", ip.as_str()])?),

        Commands::History { ip, limit, offset } => client
            .get(url(&["hosts", ip.as_str(), "history"])?)
            .query(&[("limit", limit), ("offset", offset)]),

        Commands::Scan { scan_id } => client.get(url(&["scans", scan_id.as_str()])?),

        Commands::Screenshots { ip, limit, offset } => {
            let target = match ip {
                Some(ip) => url(&["hosts", ip.as_str(), "screenshots"])?,
                None => url(&["screenshots"])?,
            };
            client.get(target).query(&[("limit", limit), ("offset", offset)])
        }

        Commands::Random => client.get(url(&["hosts", "random"])?),

        Commands::DeleteScan { scan_id } => client.delete(url(&["scans", scan_id.as_str()])?),

        Commands::DeleteHost { ip } => client.delete(url(&["hosts", ip.as_str()])?),

        Commands::Health => client.get(url(&["health"])?),
    };

    print_body(request.send().await?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_are_percent_encoded() {
        let endpoint = Url::parse("http://localhost:8080").unwrap();
        let url = api_url(&endpoint, &["scans", "a/b?c#d"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/scans/a%2Fb%3Fc%23d");
    }

    #[test]
    fn test_endpoint_path_prefix_is_kept() {
        let endpoint = Url::parse("http://natlas.lan/api/").unwrap();
        let url = api_url(&endpoint, &["hosts", "10.0.0.1"]).unwrap();
        assert_eq!(url.as_str(), "http://natlas.lan/api/hosts/10.0.0.1");
    }

    #[test]
    fn test_index_flag_parses_names() {
        let cli = Cli::try_parse_from(["natlas-cli", "search", "ssh", "--index", "history"]).unwrap();
        match cli.command {
            Commands::Search { index, .. } => assert_eq!(index, SearchIndex::History),
            _ => panic!("expected search"),
        }
        assert!(Cli::try_parse_from(["natlas-cli", "search", "--index", "archive"]).is_err());
    }
}
