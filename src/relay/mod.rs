// Upstream SSE → caller SSE re-framing.
//
// The upstream multiplexes several event types over `data:` lines; only
// `conversation.message.delta` answers are relayed, followed by the `[DONE]`
// sentinel when the upstream announces `event: done`.

pub mod frame;
pub mod parser;


use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

pub use frame::RelayFrame;
pub use parser::RelayParser;

use crate::upstream::UpstreamBody;

/// Re-frames an upstream body into caller frames as chunks arrive.
///
/// A read error ends the stream quietly: headers are already sent, so there is
/// no status left to change, and no sentinel is invented.
pub fn relay_frames(mut body: UpstreamBody) -> impl Stream<Item = RelayFrame> + Send + 'static {
    async_stream::stream! {
        let mut parser = RelayParser::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in parser.feed(&bytes) {
                        yield frame;
                    }
                }
                Err(e) => {
                    warn!("Upstream stream failed mid-response, closing caller stream: {e}");
                    break;
                }
            }
        }

        if !parser.is_done() {
            debug!("upstream stream ended without a done event");
        }
        parser.finish();
    }
}
