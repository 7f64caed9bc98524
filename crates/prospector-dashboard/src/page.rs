//! The self-contained dashboard page. No external assets; the page
//! polls the JSON endpoints every three seconds.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>prospector</title>
<style>
  body { font-family: ui-monospace, monospace; background: #111; color: #ddd;
         margin: 2rem auto; max-width: 60rem; padding: 0 1rem; }
  h1 { font-size: 1.2rem; color: #8fd; }
  h2 { font-size: 1rem; color: #9ab; border-bottom: 1px solid #333; }
  table { border-collapse: collapse; width: 100%; }
  td, th { text-align: left; padding: 0.2rem 0.8rem 0.2rem 0; }
  .num { color: #8fd; }
  .err { color: #f88; }
  .muted { color: #777; }
</style>
</head>
<body>
<h1>prospector pipeline</h1>

<h2>spend</h2>
<table id="spend">
  <tr><td>lifetime</td><td class="num" id="lifetime">-</td></tr>
  <tr><td>lifetime limit</td><td class="num" id="limit">-</td></tr>
  <tr><td>last 24h</td><td class="num" id="window">-</td></tr>
  <tr><td>current run</td><td class="num" id="run">-</td></tr>
</table>

<h2>outcomes (24h)</h2>
<table id="outcomes">
  <tr><td>uploaded</td><td class="num" id="completed">-</td></tr>
  <tr><td>discarded</td><td class="num" id="discarded">-</td></tr>
  <tr><td>rejected</td><td class="num" id="rejected">-</td></tr>
  <tr><td>failed</td><td class="num err" id="failed">-</td></tr>
</table>

<h2>in flight</h2>
<div id="posts" class="muted">-</div>

<h2>activity</h2>
<table id="activity"></table>

<script>
const fmt = (x) => typeof x === "number" ? "$" + x.toFixed(4) : x;

async function poll() {
  try {
    const stats = await (await fetch("/api/stats")).json();
    if (stats.ok) {
      const d = stats.data;
      document.getElementById("lifetime").textContent = fmt(d.lifetime_spend);
      document.getElementById("limit").textContent = fmt(d.max_usd_lifetime);
      document.getElementById("window").textContent = fmt(d.window_spend);
      document.getElementById("run").textContent = d.current_run
        ? "run " + d.current_run.run_id + " " + fmt(d.current_run.cost_usd)
        : "idle";
      document.getElementById("completed").textContent = d.completed;
      document.getElementById("discarded").textContent = d.discarded;
      document.getElementById("rejected").textContent = d.rejected;
      document.getElementById("failed").textContent = d.failed;
    }

    const posts = await (await fetch("/api/posts")).json();
    if (posts.ok) {
      document.getElementById("posts").textContent = posts.data.length
        ? posts.data.map(p => p.id + " @ " + p.stage).join(", ")
        : "none";
    }

    const activity = await (await fetch("/api/activity")).json();
    if (activity.ok) {
      const rows = activity.data.map(a =>
        "<tr><td class=\"muted\">" + a.timestamp + "</td><td" +
        (a.error || a.cost_exhausted ? " class=\"err\"" : "") + ">" + a.action +
        "</td><td>" + (a.post_id || "") + "</td></tr>");
      document.getElementById("activity").innerHTML = rows.join("");
    }
  } catch (e) {
    // Server restarting; keep polling.
  }
}

poll();
setInterval(poll, 3000);
</script>
</body>
</html>
"#;
