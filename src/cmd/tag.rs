//! Caption preview command — `postbridge tag`.

use anyhow::Result;
use serde_json::json;

use postbridge::bluesky::facets_for;
use postbridge::richtext::{Segment, build_styled_text};

pub fn cmd_tag(caption: &str, as_json: bool) -> Result<()> {
    let styled = build_styled_text(caption);

    if as_json {
        let out = json!({
            "text": styled.text(),
            "segments": styled.segments(),
            "facets": facets_for(&styled),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", styled.text());
    for segment in styled.segments() {
        if let Segment::Tag { tag, .. } = segment {
            println!("  tag: {}", tag);
        }
    }
    Ok(())
}
