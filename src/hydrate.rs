//! Hydration runtime.
//!
//! Two faces of the same lifecycle. [`CUSTOM_ELEMENT_SOURCE`] is the browser
//! module the islands bundle ships: it registers the host element that lazily
//! imports an island's client module and mounts it over the server-rendered
//! markup. [`IslandHost`] is the same state machine modeled natively so the
//! connect/disconnect race semantics are testable: a monotonically increasing
//! generation counter is the only cancellation token — whoever observes a
//! changed generation after an await throws its result away.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};

/// Tag name of the hydration host element. Registered once per page context.
pub const CUSTOM_ELEMENT_TAG: &str = "atoll-island";

/// The bootstrap module served for the islands bundle. Registration is
/// guarded by a registry lookup, so loading the module twice is harmless.
pub const CUSTOM_ELEMENT_SOURCE: &str = r#"const parseProps = (raw) => {
  if (raw === null) return {}
  try {
    const parsed = JSON.parse(raw)
    return parsed !== null && typeof parsed === 'object' && !Array.isArray(parsed) ? parsed : {}
  } catch {
    return {}
  }
}

class AtollIsland extends HTMLElement {
  #app = null
  #generation = 0

  constructor() {
    super()
    const shadow = this.attachShadow({ mode: 'open' })
    const style = document.createElement('style')
    style.textContent = ':host{display:contents}'
    shadow.append(style, document.createElement('slot'))
  }

  async connectedCallback() {
    const generation = ++this.#generation
    if (this.#app) {
      this.#app.unmount()
      this.#app = null
    }

    const entry = this.getAttribute('entry')
    if (!entry) {
      return
    }

    const [{ createSSRApp }, module] = await Promise.all([
      import('vue'),
      import(/* @vite-ignore */ entry),
    ])

    if (generation !== this.#generation || !this.isConnected) {
      return
    }

    this.#app = createSSRApp(module.default, parseProps(this.getAttribute('serialized-props')))
    this.#app.mount(this)
  }

  disconnectedCallback() {
    this.#generation++
    if (this.#app) {
      this.#app.unmount()
      this.#app = null
    }
  }
}

if (!window.customElements.get('atoll-island')) {
  window.customElements.define('atoll-island', AtollIsland)
}
"#;

// ---------------------------------------------------------------------------
// Native Lifecycle Model
// ---------------------------------------------------------------------------

/// A mounted client application instance.
pub trait IslandApp: Send {
    fn mount(&mut self);
    fn unmount(&mut self);
}

/// What a resolved client module produces: a factory from parsed props to an
/// app instance.
pub type AppFactory = Box<dyn FnOnce(Map<String, Value>) -> Box<dyn IslandApp> + Send>;

/// One hydration host instance: at most one mounted app, one generation
/// counter shared by connect and disconnect.
#[derive(Default)]
pub struct IslandHost {
    generation: AtomicU64,
    connected: AtomicBool,
    mounted: Mutex<Option<Box<dyn IslandApp>>>,
}

impl IslandHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect lifecycle step. Without an entry reference this is a no-op
    /// (nested-island passthrough markers stay inert). Otherwise the entry
    /// module is loaded asynchronously and mounted only if no connect or
    /// disconnect intervened while the load was in flight.
    ///
    /// Returns whether an app was mounted.
    pub async fn connect<F, Fut>(
        &self,
        entry: Option<&str>,
        serialized_props: Option<&str>,
        load: F,
    ) -> anyhow::Result<bool>
    where
        F: FnOnce(&str) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<AppFactory>>,
    {
        self.connected.store(true, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(mut app) = self.take_mounted() {
            app.unmount();
        }

        let Some(entry) = entry else {
            return Ok(false);
        };

        let factory = load(entry).await?;

        // A newer connect or a disconnect invalidated this cycle.
        if self.generation.load(Ordering::SeqCst) != generation
            || !self.connected.load(Ordering::SeqCst)
        {
            return Ok(false);
        }

        let mut app = factory(parse_props(serialized_props));
        app.mount();
        *self.mounted.lock().expect("island host poisoned") = Some(app);
        Ok(true)
    }

    /// Disconnect lifecycle step: invalidates any in-flight connect and
    /// unmounts the current app. Safe with nothing mounted.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut app) = self.take_mounted() {
            app.unmount();
        }
    }

    /// Whether an app is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.mounted.lock().expect("island host poisoned").is_some()
    }

    fn take_mounted(&self) -> Option<Box<dyn IslandApp>> {
        self.mounted.lock().expect("island host poisoned").take()
    }
}

/// Parse the serialized-props attribute. Anything but a JSON object — absent
/// attribute, malformed JSON, a non-object value — yields the empty prop set.
pub fn parse_props(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct TestApp {
        mounts: Arc<AtomicUsize>,
        unmounts: Arc<AtomicUsize>,
    }

    impl IslandApp for TestApp {
        fn mount(&mut self) {
            self.mounts.fetch_add(1, Ordering::SeqCst);
        }

        fn unmount(&mut self) {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Counters {
        mounts: Arc<AtomicUsize>,
        unmounts: Arc<AtomicUsize>,
        seen_props: Arc<Mutex<Option<Map<String, Value>>>>,
    }

    fn counters() -> Counters {
        Counters {
            mounts: Arc::new(AtomicUsize::new(0)),
            unmounts: Arc::new(AtomicUsize::new(0)),
            seen_props: Arc::new(Mutex::new(None)),
        }
    }

    fn factory(c: &Counters) -> AppFactory {
        let mounts = Arc::clone(&c.mounts);
        let unmounts = Arc::clone(&c.unmounts);
        let seen = Arc::clone(&c.seen_props);
        Box::new(move |props| {
            *seen.lock().unwrap() = Some(props);
            Box::new(TestApp { mounts, unmounts })
        })
    }

    #[tokio::test]
    async fn connect_loads_and_mounts() {
        let host = IslandHost::new();
        let c = counters();
        let mounted = host
            .connect(Some("/counter.js"), Some(r#"{"count":1}"#), |_| {
                let f = factory(&c);
                async move { Ok(f) }
            })
            .await
            .unwrap();

        assert!(mounted);
        assert!(host.is_mounted());
        assert_eq!(c.mounts.load(Ordering::SeqCst), 1);
        assert_eq!(
            c.seen_props.lock().unwrap().as_ref().unwrap()["count"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn no_entry_is_a_no_op() {
        let host = IslandHost::new();
        let mounted = host
            .connect(None, None, |_| async move {
                Err(anyhow::anyhow!("loader must not run without an entry"))
            })
            .await
            .unwrap();
        assert!(!mounted);
        assert!(!host.is_mounted());
    }

    #[tokio::test]
    async fn disconnect_during_import_discards_the_result() {
        let host = Arc::new(IslandHost::new());
        let c = counters();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let task = {
            let host = Arc::clone(&host);
            let f = factory(&c);
            tokio::spawn(async move {
                host.connect(Some("/counter.js"), None, move |_| async move {
                    gate.await.expect("gate open");
                    Ok(f)
                })
                .await
            })
        };

        // Disconnect races the in-flight import.
        host.disconnect();
        release.send(()).unwrap();

        let mounted = task.await.unwrap().unwrap();
        assert!(!mounted);
        assert!(!host.is_mounted());
        assert_eq!(c.mounts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reconnect_unmounts_the_previous_app() {
        let host = IslandHost::new();
        let c = counters();

        for _ in 0..2 {
            host.connect(Some("/counter.js"), None, |_| {
                let f = factory(&c);
                async move { Ok(f) }
            })
            .await
            .unwrap();
        }

        assert_eq!(c.mounts.load(Ordering::SeqCst), 2);
        assert_eq!(c.unmounts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_unmounts_and_tolerates_repeats() {
        let host = IslandHost::new();
        let c = counters();
        host.connect(Some("/counter.js"), None, |_| {
            let f = factory(&c);
            async move { Ok(f) }
        })
        .await
        .unwrap();

        host.disconnect();
        host.disconnect();

        assert!(!host.is_mounted());
        assert_eq!(c.unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn props_parse_with_fallbacks() {
        assert!(parse_props(None).is_empty());
        assert!(parse_props(Some("{invalid")).is_empty());
        assert!(parse_props(Some("\"string\"")).is_empty());
        assert!(parse_props(Some("[1,2]")).is_empty());
        let map = parse_props(Some(r#"{"msg":"hello","count":42}"#));
        assert_eq!(map["msg"], json!("hello"));
        assert_eq!(map["count"], json!(42));
    }

    #[test]
    fn bootstrap_module_registers_once() {
        assert!(CUSTOM_ELEMENT_SOURCE.contains("customElements.get('atoll-island')"));
        assert!(CUSTOM_ELEMENT_SOURCE.contains("customElements.define('atoll-island'"));
        assert!(CUSTOM_ELEMENT_SOURCE.contains(":host{display:contents}"));
    }
}
