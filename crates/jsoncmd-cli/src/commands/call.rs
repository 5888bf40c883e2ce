//! `jsoncmd call`: Invoke a target operation in-process.

use jsoncmd_core::{Dispatcher, Envelope, RequestHead, RequestMethod, TransportRequest};

use super::print_json;

pub async fn call(
    dispatcher: &Dispatcher,
    target: &str,
    operation: &str,
    args: &str,
) -> Result<(), String> {
    let envelope = dispatch(dispatcher, target, operation, args).await?;
    let value = serde_json::to_value(&envelope)
        .map_err(|e| format!("Failed to serialize envelope: {}", e))?;
    print_json(&value);
    Ok(())
}

/// Run one command through the dispatcher exactly as an HTTP POST would.
pub async fn dispatch(
    dispatcher: &Dispatcher,
    target: &str,
    operation: &str,
    args: &str,
) -> Result<Envelope, String> {
    let head = RequestHead::new(RequestMethod::Post, format!("/{}/{}", target, operation));
    let body = args.as_bytes().to_vec();
    let request = TransportRequest::post(head, Some(body.len() as u64), Ok(body));

    dispatcher
        .handle(request)
        .await
        .envelope()
        .ok_or_else(|| format!("'{}.{}' did not produce a JSON envelope", target, operation))
}
