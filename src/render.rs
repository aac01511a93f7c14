//! Splash and status page rendering
//!
//! Both pages are self-contained HTML with inline styles; the splash embeds a
//! small script that probes the backend until it answers with the configured
//! status code, then reloads. Readiness probing is entirely client-side: the
//! controller never contacts the backend itself.

use crate::host::ContainerInfo;
use crate::state::ManagedState;
use std::time::Duration;

const SPLASH_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Starting {{hostname}}</title>
<style>
  body { font-family: system-ui, sans-serif; background: #10151c; color: #e6e8eb;
         display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; }
  .card { text-align: center; }
  .spinner { width: 44px; height: 44px; margin: 0 auto 1.2rem;
             border: 4px solid #2c3642; border-top-color: #5fa8f5; border-radius: 50%;
             animation: spin 0.9s linear infinite; }
  @keyframes spin { to { transform: rotate(360deg); } }
  h1 { font-size: 1.3rem; font-weight: 500; margin: 0 0 0.4rem; }
  p { color: #8b97a5; margin: 0; font-size: 0.9rem; }
</style>
</head>
<body>
<div class="card">
  <div class="spinner"></div>
  <h1>Waking up {{hostname}}</h1>
  <p>{{name}} is starting; this page will refresh when it is ready.</p>
</div>
<script>
  async function probe() {
    try {
      const res = await fetch("{{path}}", { method: "{{method}}", cache: "no-store" });
      if (res.status === {{code}}) {
        window.location.reload();
        return;
      }
    } catch (_) {}
    setTimeout(probe, 1000);
  }
  setTimeout(probe, 1000);
</script>
</body>
</html>
"#;

const STATUS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>idlegate status</title>
<style>
  body { font-family: system-ui, sans-serif; background: #10151c; color: #e6e8eb;
         margin: 2rem auto; max-width: 64rem; padding: 0 1rem; }
  h1 { font-size: 1.4rem; font-weight: 600; }
  h2 { font-size: 1.1rem; font-weight: 500; margin-top: 2rem; color: #aeb8c2; }
  table { border-collapse: collapse; width: 100%; font-size: 0.9rem; }
  th, td { text-align: left; padding: 0.4rem 0.8rem; border-bottom: 1px solid #2c3642; }
  th { color: #8b97a5; font-weight: 500; }
  .muted { color: #8b97a5; }
  .badge { display: inline-block; padding: 0.1rem 0.5rem; border-radius: 0.6rem;
           font-size: 0.75rem; background: #22303d; color: #5fa8f5; }
</style>
</head>
<body>
<h1>idlegate</h1>
<h2>Active containers</h2>
{{active}}
<h2>Qualifying containers</h2>
{{qualifying}}
<h2>Dependency providers</h2>
{{providers}}
</body>
</html>
"#;

/// Render the transient splash for a container that is starting (or running).
pub fn splash(hostname: &str, state: &ManagedState) -> String {
    SPLASH_HTML
        .replace("{{hostname}}", &escape(hostname))
        .replace("{{name}}", &escape(state.name()))
        .replace("{{path}}", &escape(state.wait_for_path()))
        .replace("{{method}}", &escape(state.wait_for_method()))
        .replace("{{code}}", &state.wait_for_code().to_string())
}

/// Render the status page: active registry entries plus discovery listings.
pub fn status_page(
    active: &[ManagedState],
    qualifying: &[ContainerInfo],
    providers: &[ContainerInfo],
) -> String {
    STATUS_HTML
        .replace("{{active}}", &active_table(active))
        .replace("{{qualifying}}", &container_table(qualifying))
        .replace("{{providers}}", &container_table(providers))
}

fn active_table(active: &[ManagedState]) -> String {
    if active.is_empty() {
        return r#"<p class="muted">No containers are currently managed.</p>"#.to_string();
    }

    let rows: Vec<String> = active
        .iter()
        .map(|state| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{} / {}</td><td>{}</td><td>{}</td></tr>",
                escape(state.name()),
                fmt_duration(state.uptime()),
                fmt_duration(state.idle_for()),
                fmt_bytes(state.rx()),
                fmt_bytes(state.tx()),
                fmt_duration(state.stop_delay()),
                if state.pinned() {
                    r#"<span class="badge">starting</span>"#
                } else {
                    ""
                },
            )
        })
        .collect();

    format!(
        "<table><tr><th>Container</th><th>Up</th><th>Idle</th><th>Rx / Tx</th>\
         <th>Stop delay</th><th></th></tr>{}</table>",
        rows.join("")
    )
}

fn container_table(containers: &[ContainerInfo]) -> String {
    if containers.is_empty() {
        return r#"<p class="muted">None found.</p>"#.to_string();
    }

    let rows: Vec<String> = containers
        .iter()
        .map(|ct| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&ct.display_name()),
                escape(&ct.image),
                if ct.running { "running" } else { "stopped" },
            )
        })
        .collect();

    format!(
        "<table><tr><th>Container</th><th>Image</th><th>State</th></tr>{}</table>",
        rows.join("")
    )
}

/// Round a duration to whole seconds and render it compactly: `42s`, `3m12s`,
/// `1h4m`.
pub fn fmt_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Render a byte count with a binary unit suffix.
pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ContainerInfo;
    use std::collections::HashMap;
    use std::time::Duration;

    fn state(labels: &[(&str, &str)]) -> ManagedState {
        let ct = ContainerInfo {
            id: "0123456789abcdef".to_string(),
            names: vec!["/app1".to_string()],
            image: "img".to_string(),
            running: true,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        ManagedState::from_container(&ct, "lazyload", Duration::from_secs(300))
    }

    #[test]
    fn test_splash_interpolation() {
        let state = state(&[
            ("lazyload", ""),
            ("lazyload.waitforcode", "204"),
            ("lazyload.waitforpath", "/ready"),
            ("lazyload.waitformethod", "GET"),
        ]);
        let html = splash("app1.example", &state);

        assert!(html.contains("Waking up app1.example"));
        assert!(html.contains("app1 (01234567)"));
        assert!(html.contains(r#"fetch("/ready""#));
        assert!(html.contains(r#"method: "GET""#));
        assert!(html.contains("res.status === 204"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_status_page_empty() {
        let html = status_page(&[], &[], &[]);
        assert!(html.contains("No containers are currently managed."));
    }

    #[test]
    fn test_status_page_lists_entries() {
        let entries = vec![state(&[("lazyload", "")])];
        let html = status_page(&entries, &[], &[]);
        assert!(html.contains("app1 (01234567)"));
    }

    #[test]
    fn test_fmt_duration() {
        assert_eq!(fmt_duration(Duration::from_secs(42)), "42s");
        assert_eq!(fmt_duration(Duration::from_secs(192)), "3m12s");
        assert_eq!(fmt_duration(Duration::from_secs(3840)), "1h4m");
        assert_eq!(fmt_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KiB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
