//! The single HTML page: upload form plus the last result or error.

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>PDF to MediaWiki</title>
<style>
body { font-family: sans-serif; max-width: 60rem; margin: 2rem auto; padding: 0 1rem; }
.error { color: #a00; border: 1px solid #a00; padding: .5rem 1rem; }
textarea { width: 100%; height: 30rem; font-family: monospace; }
</style>
</head>
<body>
<h1>PDF to MediaWiki converter</h1>
<form method="post" action="/" enctype="multipart/form-data">
<input type="file" name="pdf_file" accept=".pdf,application/pdf">
<button type="submit">Convert</button>
</form>
"#;

const TAIL: &str = "</body>\n</html>\n";

/// Render the page; `outcome` is the wiki text or an error message.
pub(super) fn render(outcome: Option<Result<&str, &str>>) -> String {
    let mut html = String::from(HEAD);
    match outcome {
        None => {}
        Some(Ok(wikitext)) => {
            html.push_str("<h2>Wikitext</h2>\n<textarea readonly>");
            html.push_str(&escape(wikitext));
            html.push_str("</textarea>\n");
        }
        Some(Err(message)) => {
            html.push_str("<p class=\"error\">");
            html.push_str(&escape(message));
            html.push_str("</p>\n");
        }
    }
    html.push_str(TAIL);
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
