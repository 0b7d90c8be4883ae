//! The loop-until-absent cursor walk shared by every paginated `list`
//! method (`tools/list`, `resources/list`, `resources/templates/list`,
//! `prompts/list`): send the request, collect the page, and keep going
//! until the result carries no `nextCursor`.

use crate::error::SessionResult;
use crate::session::Session;
use mcp_protocol::meta::Cursor;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A `list`-style request's params: every such params type is just an
/// optional cursor plus method-specific filters, so this only needs to set
/// the cursor for the next page.
pub trait CursorParams {
    fn set_cursor(&mut self, cursor: Option<Cursor>);
}

/// A `list`-style result: a page of items plus the cursor for the next one,
/// `None` when this was the last page.
pub trait CursorPage {
    type Item;

    fn into_page(self) -> (Vec<Self::Item>, Option<Cursor>);
}

macro_rules! impl_cursor_params {
    ($ty:ty) => {
        impl CursorParams for $ty {
            fn set_cursor(&mut self, cursor: Option<Cursor>) {
                self.cursor = cursor;
            }
        }
    };
}

impl_cursor_params!(mcp_protocol::tools::ListToolsParams);
impl_cursor_params!(mcp_protocol::resources::ListResourcesParams);
impl_cursor_params!(mcp_protocol::resources::ListResourceTemplatesParams);
impl_cursor_params!(mcp_protocol::prompts::ListPromptsParams);

impl CursorPage for mcp_protocol::tools::ListToolsResult {
    type Item = mcp_protocol::tools::Tool;

    fn into_page(self) -> (Vec<Self::Item>, Option<Cursor>) {
        (self.tools, self.next_cursor)
    }
}

impl CursorPage for mcp_protocol::resources::ListResourcesResult {
    type Item = mcp_protocol::resources::Resource;

    fn into_page(self) -> (Vec<Self::Item>, Option<Cursor>) {
        (self.resources, self.next_cursor)
    }
}

impl CursorPage for mcp_protocol::resources::ListResourceTemplatesResult {
    type Item = mcp_protocol::resources::ResourceTemplate;

    fn into_page(self) -> (Vec<Self::Item>, Option<Cursor>) {
        (self.resource_templates, self.next_cursor)
    }
}

impl CursorPage for mcp_protocol::prompts::ListPromptsResult {
    type Item = mcp_protocol::prompts::Prompt;

    fn into_page(self) -> (Vec<Self::Item>, Option<Cursor>) {
        (self.prompts, self.next_cursor)
    }
}

/// Walks every page of a paginated `list` request, accumulating items until
/// a response carries no `nextCursor`. Each page round-trips through the
/// ordinary `send_request` path, so progress/cancellation work exactly as
/// for any other request.
pub async fn list_all<P, R>(session: &Session, method: &str, mut params: P) -> SessionResult<Vec<R::Item>>
where
    P: Serialize + CursorParams,
    R: DeserializeOwned + CursorPage,
{
    let mut items = Vec::new();
    loop {
        let value = session.send_request(method, Some(serde_json::to_value(&params)?)).await?;
        let result: R = serde_json::from_value(value)?;
        let (mut page, next_cursor) = result.into_page();
        items.append(&mut page);
        match next_cursor {
            Some(cursor) => params.set_cursor(Some(cursor)),
            None => break,
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SessionContext, Side};
    use mcp_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
    use mcp_protocol::tools::{ListToolsParams, ListToolsResult, Tool};
    use mcp_protocol::version::McpVersion;
    use tokio::sync::mpsc;

    fn new_test_session() -> (std::sync::Arc<Session>, mpsc::UnboundedReceiver<JsonRpcMessage>, mpsc::UnboundedSender<JsonRpcMessage>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let session = Session::new(out_tx, SessionContext::new(Side::Client, McpVersion::LATEST));
        let driver = std::sync::Arc::clone(&session);
        tokio::spawn(async move { driver.run(in_rx).await });
        (session, out_rx, in_tx)
    }

    fn tool(name: &str) -> Tool {
        Tool { name: name.to_string(), description: None, input_schema: serde_json::json!({}), output_schema: None }
    }

    #[tokio::test]
    async fn walks_every_page_until_next_cursor_is_absent() {
        let (session, mut out_rx, in_tx) = new_test_session();
        let walk = tokio::spawn({
            let session = std::sync::Arc::clone(&session);
            async move { list_all::<ListToolsParams, ListToolsResult>(&session, "tools/list", ListToolsParams::default()).await }
        });

        let JsonRpcMessage::Request(req) = out_rx.recv().await.unwrap() else { panic!("expected request") };
        let page1 = ListToolsResult { tools: vec![tool("a"), tool("b")], next_cursor: Some(Cursor::new("page-2")) };
        in_tx.send(JsonRpcMessage::Response(JsonRpcResponse::new(req.id, serde_json::to_value(&page1).unwrap()))).unwrap();

        let JsonRpcMessage::Request(req) = out_rx.recv().await.unwrap() else { panic!("expected request") };
        assert_eq!(req.params.as_ref().unwrap().as_value()["cursor"], "page-2");
        let page2 = ListToolsResult { tools: vec![tool("c")], next_cursor: None };
        in_tx.send(JsonRpcMessage::Response(JsonRpcResponse::new(req.id, serde_json::to_value(&page2).unwrap()))).unwrap();

        let names: Vec<_> = walk.await.unwrap().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn single_page_with_no_cursor_returns_immediately() {
        let (session, mut out_rx, in_tx) = new_test_session();
        let walk = tokio::spawn({
            let session = std::sync::Arc::clone(&session);
            async move { list_all::<ListToolsParams, ListToolsResult>(&session, "tools/list", ListToolsParams::default()).await }
        });

        let JsonRpcMessage::Request(req) = out_rx.recv().await.unwrap() else { panic!("expected request") };
        let page = ListToolsResult { tools: vec![tool("only")], next_cursor: None };
        in_tx.send(JsonRpcMessage::Response(JsonRpcResponse::new(req.id, serde_json::to_value(&page).unwrap()))).unwrap();

        let names: Vec<_> = walk.await.unwrap().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["only"]);
        assert!(out_rx.try_recv().is_err());
    }
}
