//! Browser bootstrap scripts and their injection into HTML pages.

use std::time::Duration;

use ars_config::Transport;

use super::EVENTS_PATH;

const ENDPOINT: &str = "__ENDPOINT__";
const INTERVAL: &str = "__INTERVAL__";

const POLL_SCRIPT: &str = r#"<script type="text/javascript">
(function () {
  const clientId = window.crypto && window.crypto.randomUUID ? window.crypto.randomUUID() : null;
  const url = clientId ? '__ENDPOINT__?client=' + clientId : '__ENDPOINT__';
  console.log('[autoreload-server] Polling every __INTERVAL__ms');

  const checkForUpdates = async () => {
    try {
      const response = await fetch(url, { cache: 'no-cache', headers: { 'Cache-Control': 'no-cache' } });
      const data = await response.json();
      if (data.type === 'update' && data.reload) {
        console.log('[autoreload-server] Reloading page...');
        window.location.reload(true);
      }
    } catch (error) {
      console.error('[autoreload-server] Polling error:', error);
    }
  };

  const timer = setInterval(checkForUpdates, __INTERVAL__);
  checkForUpdates();
  window.addEventListener('beforeunload', () => clearInterval(timer));
})();
</script>
"#;

const SSE_SCRIPT: &str = r#"<script type="text/javascript">
(function () {
  const connect = () => {
    const source = new EventSource('__ENDPOINT__');
    source.onmessage = (event) => {
      const data = JSON.parse(event.data);
      if (data.type === 'update' && data.reload) {
        console.log('[autoreload-server] Reloading page...');
        source.close();
        window.location.reload(true);
      }
    };
    source.onerror = () => {
      source.close();
      setTimeout(connect, __INTERVAL__);
    };
  };
  connect();
})();
</script>
"#;

const WEBSOCKET_SCRIPT: &str = r#"<script type="text/javascript">
(function () {
  const scheme = window.location.protocol === 'https:' ? 'wss://' : 'ws://';
  const connect = () => {
    const socket = new WebSocket(scheme + window.location.host + '__ENDPOINT__');
    socket.onmessage = (event) => {
      const data = JSON.parse(event.data);
      if (data.type === 'update' && data.reload) {
        console.log('[autoreload-server] Reloading page...', data.path || '');
        window.location.reload(true);
      }
    };
    socket.onclose = () => setTimeout(connect, __INTERVAL__);
  };
  connect();
})();
</script>
"#;

/// The bootstrap script for `transport`.
///
/// Polling clients poll every `interval`; streaming clients wait that long
/// before reconnecting.
pub fn client_script(transport: Transport, interval: Duration) -> String {
    let template = match transport {
        Transport::Poll => POLL_SCRIPT,
        Transport::Sse => SSE_SCRIPT,
        Transport::WebSocket => WEBSOCKET_SCRIPT,
    };

    template
        .replace(ENDPOINT, EVENTS_PATH)
        .replace(INTERVAL, &interval.as_millis().to_string())
}

/// Insert `script` before the last `</body>`, or append it when there is none.
pub fn inject_client_script(html: &str, script: &str) -> String {
    let position = html.to_ascii_lowercase().rfind("</body>");

    let mut out = String::with_capacity(html.len() + script.len());
    match position {
        Some(index) => {
            out.push_str(&html[..index]);
            out.push_str(script);
            out.push_str(&html[index..]);
        }
        None => {
            out.push_str(html);
            out.push_str(script);
        }
    }
    out
}
