// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

/// Very small, safe-ish shell escaper for paths.
pub fn sh_escape(p: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&p.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// Quotes a remote path while leaving a leading `~` to the remote shell,
/// so `~/runs/x` becomes `"$HOME"/'runs/x'`.
pub fn sh_escape_remote_path(p: &str) -> String {
    if p == "~" {
        return "\"$HOME\"".to_string();
    }
    match p.strip_prefix("~/") {
        Some("") => "\"$HOME\"/".to_string(),
        Some(rest) => format!("\"$HOME\"/{}", sh_escape(rest)),
        None => sh_escape(p),
    }
}
