use serde::{Deserialize, Serialize};

use fluentreq::prelude::{Error, Request};

#[derive(Debug, Serialize)]
struct CreateItem<'a> {
    name: &'a str,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    json: Option<serde_json::Value>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut ping = Request::<String>::new("https://httpbin.org")
        .path("/get")
        .params(["from", "fluentreq", "lang", "zh"]);
    let text = ping.fetch()?;
    println!(
        "GET /get => status={:?} body_chars={}",
        ping.last_response().map(|head| head.status),
        text.len()
    );

    let payload = CreateItem {
        name: "demo",
        enabled: true,
    };
    let echoed = Request::<EchoResponse>::new("https://httpbin.org")
        .path("/anything")
        .body_json(&payload)
        .fetch()?;
    println!("POST /anything => echoed_json={:?}", echoed.json);

    match Request::<String>::new("https://httpbin.org")
        .path("/status/418")
        .fetch()
    {
        Err(Error::HttpStatus { status, body, .. }) => {
            println!("GET /status/418 => {status} body={body:?}");
        }
        other => println!("GET /status/418 => unexpected {other:?}"),
    }
    Ok(())
}
