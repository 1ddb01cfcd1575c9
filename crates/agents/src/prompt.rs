use std::fmt::Write;

use crate::tool_registry::ToolManifestEntry;

const TOOL_CALL_GUIDANCE: &str = concat!(
    "## How to call tools\n\n",
    "For a tool call, output ONLY this JSON block:\n\n",
    "```tool_call\n",
    "{\"tool\": \"<tool_name>\", \"arguments\": {<arguments>}}\n",
    "```\n\n",
    "No text before or after the block. After the result arrives, continue normally.\n\n",
);
const TOOL_GUIDELINES: &str = concat!(
    "## Guidelines\n\n",
    "- Do not call tools for greetings, small talk, or questions you can answer directly.\n",
    "- Call one tool at a time and check its result before the next step.\n",
    "- Tool results can be errors. Read them and correct your arguments or explain the problem.\n",
    "- Once you have what you need, answer the user in plain language.\n",
);

/// Build the system prompt for a session.
///
/// `native_tools` providers receive full schemas through the API, so only a
/// compact listing is added. Otherwise every schema is spelled out together
/// with the fenced ```` ```tool_call ```` format the text recovery chain
/// understands.
pub fn build_system_prompt(base: &str, manifest: &[ToolManifestEntry], native_tools: bool) -> String {
    let mut prompt = String::from(base.trim());
    prompt.push_str("\n\n");

    if manifest.is_empty() {
        return prompt.trim_end().to_string();
    }

    append_available_tools_section(&mut prompt, manifest, native_tools);
    if !native_tools {
        prompt.push_str(TOOL_CALL_GUIDANCE);
    }
    prompt.push_str(TOOL_GUIDELINES);
    prompt
}

fn append_available_tools_section(
    prompt: &mut String,
    manifest: &[ToolManifestEntry],
    native_tools: bool,
) {
    prompt.push_str("## Available Tools\n\n");
    if native_tools {
        for entry in manifest {
            let desc = first_line(&entry.description);
            if desc.is_empty() {
                let _ = writeln!(prompt, "- `{}`", entry.name);
            } else {
                let _ = writeln!(prompt, "- `{}`: {desc}", entry.name);
            }
        }
        prompt.push('\n');
        return;
    }

    for entry in manifest {
        let _ = write!(
            prompt,
            "### {}\n{}\n\nParameters:\n```json\n{}\n```\n\n",
            entry.name,
            entry.description.trim(),
            serde_json::to_string(&entry.parameters).unwrap_or_default()
        );
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
