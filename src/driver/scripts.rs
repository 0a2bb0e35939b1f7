//! JavaScript injected into every page of a session.

/// Native dialogs would block the page forever in headless runs.
pub const AUTO_ACCEPT_DIALOGS: &str = r#"
(() => {
  window.alert = () => {};
  window.confirm = () => true;
  window.prompt = (_message, defaultValue) => defaultValue || '';
})();
"#;

/// Readiness helpers polled between steps.
pub const PAGE_HELPERS: &str = r#"
(() => {
  if (window.__legacyE2E) return;
  const LOADING = ['.loading', '.spinner', '[data-loading="true"]', '.progress-bar', '.loading-overlay'];
  const shown = (el) => {
    const style = window.getComputedStyle(el);
    return style.display !== 'none' && style.visibility !== 'hidden' && el.getClientRects().length > 0;
  };
  let lastMutation = Date.now();
  new MutationObserver(() => { lastMutation = Date.now(); })
    .observe(document, { subtree: true, childList: true, attributes: true });

  window.__legacyE2E = {
    loadingVisible: () => LOADING.some((sel) => Array.from(document.querySelectorAll(sel)).some(shown)),
    isStable: (quietMs) => Date.now() - lastMutation >= (quietMs || 500),
    isPageReady: () =>
      document.readyState === 'complete' &&
      !window.__legacyE2E.loadingVisible() &&
      window.__legacyE2E.isStable(500),
    scrollToElement: (selector) => {
      const el = document.querySelector(selector);
      if (el) el.scrollIntoView({ block: 'center', behavior: 'instant' });
      return !!el;
    },
  };
})();
"#;

/// Falls back to `readyState` when the helpers were not injected.
pub const IS_READY: &str = "() => window.__legacyE2E \
    ? window.__legacyE2E.isPageReady() \
    : document.readyState === 'complete'";

pub const BODY_TEXT: &str = "() => document.body ? document.body.innerText : ''";

pub const TITLE: &str = "() => document.title";

pub const LOCATION: &str = "() => window.location.href";

/// Deferred so the evaluate call returns before navigation starts
pub const RELOAD: &str = "() => { setTimeout(() => window.location.reload(), 0); }";

/// Select an option by value, falling back to its visible label
pub fn select_option(value: &str) -> String {
    let literal = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "el => {{
            const wanted = {literal};
            const options = Array.from(el.options || []);
            const match = options.find(o => o.value === wanted)
                || options.find(o => o.text.trim() === wanted.trim());
            if (!match) throw new Error('Option not found: ' + wanted);
            el.value = match.value;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        }}"
    )
}

/// Every script a session injects, in order
pub fn session_scripts() -> Vec<String> {
    vec![AUTO_ACCEPT_DIALOGS.to_string(), PAGE_HELPERS.to_string()]
}
