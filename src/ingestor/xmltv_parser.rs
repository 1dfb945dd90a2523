//! Quick-XML based guide parser
//!
//! Two document shapes are accepted:
//!
//! - XMLTV: `<tv><programme channel=".." start=".." stop=".."><title>..</title></programme></tv>`
//! - nested: `<epg><channel id=".."><programme start=".." stop=".">..</programme></channel></epg>`
//!
//! Only the fields the player UI consumes are extracted. Programmes are ordered
//! by their parsed start time, not by the raw token, because offsets differ
//! between feeds.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::{GuideError, GuideResult};
use crate::models::{GuideChannel, Program};
use crate::utils::time::parse_xmltv_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuideSchema {
    /// `tv > programme[channel]`
    Xmltv,
    /// `epg > channel[id] > programme`
    Nested,
}

impl GuideSchema {
    fn from_root(root: &str) -> GuideResult<Self> {
        match root {
            "tv" => Ok(GuideSchema::Xmltv),
            "epg" => Ok(GuideSchema::Nested),
            other => Err(GuideError::UnsupportedSchema {
                root: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct ProgrammeDraft {
    channel: String,
    start: String,
    stop: String,
    title: Option<String>,
}

/// Accumulates programmes from one or more guide documents
#[derive(Debug, Default)]
pub struct GuideBuilder {
    order: Vec<String>,
    channels: HashMap<String, Vec<(DateTime<Utc>, Program)>>,
    skipped: usize,
}

impl GuideBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programmes dropped because their start time could not be parsed
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Parse one document and merge its programmes, returning how many were added
    pub fn add_document(&mut self, content: &str) -> GuideResult<usize> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut schema: Option<GuideSchema> = None;
        let mut current_channel: Option<String> = None;
        let mut current_program: Option<ProgrammeDraft> = None;
        let mut in_title = false;
        let mut title_text = String::new();
        let mut added = 0;

        loop {
            let event = reader.read_event().map_err(|e| {
                GuideError::Xml(format!("{e} at position {}", reader.buffer_position()))
            })?;

            match event {
                Event::Start(ref e) => {
                    let name = local_name(e);
                    let Some(schema) = schema else {
                        schema = Some(GuideSchema::from_root(&name)?);
                        continue;
                    };

                    match name.as_str() {
                        "channel" if schema == GuideSchema::Nested => {
                            current_channel = attribute(e, "id");
                        }
                        "programme" => {
                            current_program =
                                Some(Self::start_programme(e, current_channel.as_deref()));
                        }
                        "title" if current_program.is_some() => {
                            in_title = true;
                            title_text.clear();
                        }
                        _ => {}
                    }
                }

                Event::Empty(ref e) => {
                    if schema.is_none() {
                        // A self-closing root holds no programmes
                        GuideSchema::from_root(&local_name(e))?;
                        break;
                    }
                    if local_name(e) == "programme" {
                        let draft = Self::start_programme(e, current_channel.as_deref());
                        added += usize::from(self.finish_programme(draft));
                    }
                }

                Event::Text(e) if in_title => {
                    let text = e
                        .unescape()
                        .map_err(|e| GuideError::Xml(format!("Invalid text in title: {e}")))?;
                    title_text.push_str(&text);
                }

                Event::CData(e) if in_title => {
                    title_text.push_str(&String::from_utf8_lossy(&e));
                }

                Event::End(ref e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    match name.as_str() {
                        "title" if in_title => {
                            in_title = false;
                            if let Some(program) = current_program.as_mut() {
                                if program.title.is_none() {
                                    program.title = Some(title_text.trim().to_string());
                                }
                            }
                        }
                        "programme" => {
                            if let Some(draft) = current_program.take() {
                                added += usize::from(self.finish_programme(draft));
                            }
                        }
                        "channel" if schema == Some(GuideSchema::Nested) => {
                            current_channel = None;
                        }
                        _ => {}
                    }
                }

                Event::Eof => break,

                _ => {}
            }
        }

        if schema.is_none() {
            return Err(GuideError::Xml("document has no root element".to_string()));
        }

        debug!("Guide document contributed {} programmes", added);
        Ok(added)
    }

    fn start_programme(element: &BytesStart, parent_channel: Option<&str>) -> ProgrammeDraft {
        let channel = attribute(element, "channel")
            .filter(|c| !c.is_empty())
            .or_else(|| parent_channel.map(str::to_string))
            .unwrap_or_default();

        ProgrammeDraft {
            channel,
            start: attribute(element, "start").unwrap_or_default(),
            stop: attribute(element, "stop").unwrap_or_default(),
            title: None,
        }
    }

    fn finish_programme(&mut self, draft: ProgrammeDraft) -> bool {
        if draft.channel.is_empty() {
            self.skipped += 1;
            return false;
        }

        let start_time = match parse_xmltv_datetime(&draft.start) {
            Ok(start_time) => start_time,
            Err(e) => {
                debug!("Skipping programme on '{}': {}", draft.channel, e);
                self.skipped += 1;
                return false;
            }
        };

        let program = Program {
            start: draft.start,
            stop: draft.stop,
            title: draft.title.unwrap_or_default(),
        };

        if !self.channels.contains_key(&draft.channel) {
            self.order.push(draft.channel.clone());
        }
        self.channels
            .entry(draft.channel)
            .or_default()
            .push((start_time, program));
        true
    }

    /// Sort each channel by start time, dropping later duplicates of the same slot
    pub fn finish(mut self) -> Vec<GuideChannel> {
        let guide: Vec<GuideChannel> = self
            .order
            .into_iter()
            .filter_map(|tvg_id| {
                let mut programmes = self.channels.remove(&tvg_id)?;
                programmes.sort_by_key(|(start, _)| *start);
                programmes.dedup_by_key(|(start, _)| *start);
                Some(GuideChannel {
                    tvg_id,
                    programme: programmes.into_iter().map(|(_, p)| p).collect(),
                })
            })
            .collect();

        info!(
            "Built guide for {} channels ({} programmes skipped)",
            guide.len(),
            self.skipped
        );
        guide
    }
}

/// Parse a single guide document
pub fn parse_guide(content: &str) -> GuideResult<Vec<GuideChannel>> {
    let mut builder = GuideBuilder::new();
    builder.add_document(content)?;
    Ok(builder.finish())
}

fn local_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart, key: &str) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key.as_bytes())
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XMLTV_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="news.uk"><display-name>News UK</display-name></channel>
  <programme start="20240101130000 +0000" stop="20240101140000 +0000" channel="news.uk">
    <title lang="en">Afternoon News</title>
    <title lang="fr">Nouvelles</title>
  </programme>
  <programme start="20240101120000 +0000" stop="20240101130000 +0000" channel="news.uk">
    <title>Midday &amp; More</title>
  </programme>
  <programme start="20240101120000 +0000" stop="20240101123000 +0000" channel="kids.uk">
    <title><![CDATA[Cartoons]]></title>
  </programme>
</tv>"#;

    #[test]
    fn test_parse_xmltv_schema() {
        let guide = parse_guide(XMLTV_DOC).unwrap();
        assert_eq!(guide.len(), 2);

        let news = &guide[0];
        assert_eq!(news.tvg_id, "news.uk");
        let titles: Vec<&str> = news.programme.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Midday & More", "Afternoon News"]);
        assert_eq!(news.programme[0].stop, "20240101130000 +0000");

        assert_eq!(guide[1].tvg_id, "kids.uk");
        assert_eq!(guide[1].programme[0].title, "Cartoons");
    }

    #[test]
    fn test_parse_nested_schema() {
        let doc = r#"<epg>
  <channel id="sports">
    <programme start="20240101180000 +0000" stop="20240101200000 +0000"><title>Match</title></programme>
    <programme start="20240101160000 +0000" stop="20240101180000 +0000"><title>Preview</title></programme>
  </channel>
  <channel id="movies">
    <programme start="20240101200000 +0000" stop="20240101220000 +0000"><title>Feature</title></programme>
  </channel>
</epg>"#;
        let guide = parse_guide(doc).unwrap();
        assert_eq!(guide.len(), 2);
        assert_eq!(guide[0].tvg_id, "sports");
        assert_eq!(guide[0].programme[0].title, "Preview");
        assert_eq!(guide[0].programme[1].title, "Match");
        assert_eq!(guide[1].tvg_id, "movies");
    }

    #[test]
    fn test_sorts_by_real_time_across_offsets() {
        // 12:30 +0200 is 10:30 UTC, earlier than 11:00 +0000
        let doc = r#"<tv>
  <programme start="20240101110000 +0000" stop="20240101120000 +0000" channel="c"><title>Second</title></programme>
  <programme start="20240101123000 +0200" stop="20240101130000 +0200" channel="c"><title>First</title></programme>
</tv>"#;
        let guide = parse_guide(doc).unwrap();
        let titles: Vec<&str> = guide[0].programme.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_skips_unparseable_programmes() {
        let doc = r#"<tv>
  <programme start="garbage" stop="20240101120000 +0000" channel="c"><title>Bad</title></programme>
  <programme start="20240101110000 +0000" stop="20240101120000 +0000"><title>No channel</title></programme>
  <programme start="20240101110000 +0000" stop="20240101120000 +0000" channel="c"><title>Good</title></programme>
</tv>"#;
        let mut builder = GuideBuilder::new();
        assert_eq!(builder.add_document(doc).unwrap(), 1);
        assert_eq!(builder.skipped(), 2);
        let guide = builder.finish();
        assert_eq!(guide[0].programme.len(), 1);
        assert_eq!(guide[0].programme[0].title, "Good");
    }

    #[test]
    fn test_merges_documents_and_drops_duplicate_slots() {
        let first = r#"<tv><programme start="20240101110000 +0000" stop="20240101120000 +0000" channel="c"><title>A</title></programme></tv>"#;
        let second = r#"<epg><channel id="c"><programme start="20240101110000 +0000" stop="20240101120000 +0000"><title>A again</title></programme><programme start="20240101120000 +0000" stop="20240101130000 +0000"><title>B</title></programme></channel></epg>"#;

        let mut builder = GuideBuilder::new();
        builder.add_document(first).unwrap();
        builder.add_document(second).unwrap();
        let guide = builder.finish();

        assert_eq!(guide.len(), 1);
        let titles: Vec<&str> = guide[0].programme.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_rejects_unknown_root_and_malformed_xml() {
        assert!(matches!(
            parse_guide("<rss><channel/></rss>"),
            Err(GuideError::UnsupportedSchema { .. })
        ));
        assert!(matches!(
            parse_guide("<tv><programme></tv>"),
            Err(GuideError::Xml(_))
        ));
        assert!(parse_guide("").is_err());
    }

    #[test]
    fn test_empty_guide_documents() {
        assert!(parse_guide("<tv/>").unwrap().is_empty());
        assert!(parse_guide("<epg></epg>").unwrap().is_empty());
    }
}
