use std::thread;

use fluentreq::prelude::{Request, TeeBuffer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One configured descriptor, cloned per call.
    let base = Request::<String>::new("https://httpbin.org")
        .header("accept", "application/json")
        .header("x-client", "fluentreq-shared-base");

    let handles: Vec<_> = ["/uuid", "/ip", "/user-agent"]
        .into_iter()
        .map(|path| {
            let mut request = base.clone().path(path);
            thread::spawn(move || request.fetch().map(|body| (path, body)))
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok((path, body))) => println!("GET {path} => {}", body.trim()),
            Ok(Err(error)) => println!("request failed: {error}"),
            Err(_) => println!("worker panicked"),
        }
    }

    let tee = TeeBuffer::new();
    let length = Request::<Vec<u8>>::new("https://httpbin.org")
        .path("/gzip")
        .to_body(&tee)
        .fetch()?
        .len();
    println!("GET /gzip => decoded_bytes={length} tee_bytes={}", tee.len());
    Ok(())
}
