//! Serve a custom controller next to the built-in ones and call it.
//!
//! Usage: cargo run -p jsoncmd-server --example greeter

use std::sync::Arc;
use std::time::Duration;

use jsoncmd_core::{OperationPolicy, StaticRegistry, TargetType};
use jsoncmd_server::state::AppStateInner;

#[derive(Default)]
struct Greeter;

impl Greeter {
    fn say_hello(&self, name: &str) -> String {
        format!("Hello, {}", name)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    jsoncmd_server::init_tracing();

    let greeter = TargetType::builder::<Greeter>("Greeter")
        .operation("sayHello", 1, |g, args| async move {
            let name: String = args.get(0)?;
            Ok(g.say_hello(&name))
        })
        .operation_with("reset", 0, OperationPolicy::disallowed(), |_g, _args| async move {
            Ok(())
        })
        .build()?;

    let registry = StaticRegistry::new();
    jsoncmd_server::controllers::register_builtins(&registry)?;
    registry.register("Greeter", Arc::new(Greeter), greeter)?;

    // Start the server on a random port
    let config = jsoncmd_server::ServerConfig {
        port: 0,
        ..Default::default()
    };
    let state = Arc::new(AppStateInner::new(Arc::new(registry), config.dispatch.clone()));
    let addr = jsoncmd_server::start_server_with_state(config, state).await?;
    println!("Server started on {}", addr);

    // Give the server a moment to settle
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let base = format!("http://{}/json", addr);

    println!("\n=== GET Greeter.sayHello ===");
    let res = client
        .get(format!(
            "{}/Greeter/sayHello?json={}",
            base,
            urlencoding::encode(r#"["World"]"#)
        ))
        .send()
        .await?;
    println!("{}", res.text().await?);

    println!("\n=== POST Greeter.sayHello (wrong arity) ===");
    let res = client
        .post(format!("{}/Greeter/sayHello", base))
        .body("[]")
        .send()
        .await?;
    println!("{}", res.text().await?);

    println!("\n=== POST Greeter.reset (disallowed) ===");
    let res = client
        .post(format!("{}/Greeter/reset", base))
        .body("[]")
        .send()
        .await?;
    println!("{}", res.text().await?);

    println!("\n=== GET /api/targets ===");
    let res = client
        .get(format!("http://{}/api/targets", addr))
        .send()
        .await?;
    let body: serde_json::Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}
