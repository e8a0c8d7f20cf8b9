//! Payload helpers shared by the handler sets and remote proxies

use serde::de::DeserializeOwned;
use serde::Serialize;
use xxdk_core::Result;
use xxdk_protocol::{decode_payload, encode_payload, Tag};
use xxdk_worker::{Reply, WorkerManager};

/// Turn a handler result into a reply; errors travel as serialised [`xxdk_core::XxdkError`]s
pub(crate) fn reply<T: Serialize>(result: Result<T>) -> Reply {
    match result.and_then(|value| encode_payload(&value)) {
        Ok(data) => Reply::Ok(data),
        Err(e) => Reply::Err(e.to_wire()),
    }
}

/// Reply with an empty payload on success
pub(crate) fn reply_empty(result: Result<()>) -> Reply {
    match result {
        Ok(()) => Reply::Ok(Vec::new()),
        Err(e) => Reply::Err(e.to_wire()),
    }
}

/// Call `tag` with a JSON payload and decode the JSON reply
pub(crate) async fn call<Req, Resp>(manager: &WorkerManager, tag: Tag, request: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let data = manager.call(tag, encode_payload(request)?).await?;
    decode_payload(&data)
}

/// Call `tag` and ignore the reply payload
pub(crate) async fn call_empty<Req>(manager: &WorkerManager, tag: Tag, request: &Req) -> Result<()>
where
    Req: Serialize,
{
    manager.call(tag, encode_payload(request)?).await?;
    Ok(())
}
