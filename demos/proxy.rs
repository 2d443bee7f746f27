use std::env;

use fluentreq::prelude::Request;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proxy = env::var("FLUENTREQ_PROXY").unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned());

    let mut request = Request::<String>::new("https://httpbin.org")
        .path("/ip")
        .proxy(&proxy);
    if let Some(error) = request.error() {
        println!("proxy rejected: {error}");
        return Ok(());
    }

    println!("{}", String::from_utf8_lossy(&request.dump()?));
    let body = request.fetch()?;
    println!("GET /ip via {proxy} => {}", body.trim());
    Ok(())
}
