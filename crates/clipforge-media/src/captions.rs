//! Caption overlay rendering: subtitle slicing and ASS stylesheet
//! generation, including word-by-word animation.

use clipforge_core::format_ass_time;
use serde::{Deserialize, Serialize};

/// One subtitle line with clip-relative times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleEntry {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
}

/// Vertical placement of the caption block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Bottom,
    Center,
    Top,
}

impl CaptionPosition {
    /// ASS numpad alignment.
    fn alignment(self) -> u8 {
        match self {
            Self::Bottom => 2,
            Self::Center => 5,
            Self::Top => 8,
        }
    }
}

/// Caption animation style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptionAnimation {
    None,
    WordByWord,
    Pop,
}

/// Styling for the rendered overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    /// `#RRGGBB` text fill.
    pub primary_color: String,
    /// `#RRGGBB` outline.
    pub outline_color: String,
    /// `#RRGGBB` box/shadow color behind the text.
    pub background_color: String,
    pub bold: bool,
    pub outline: f32,
    pub shadow: f32,
    pub position: CaptionPosition,
    pub animation: CaptionAnimation,
}

impl CaptionStyle {
    /// Look up a named preset; `off` and unknown names give `None`.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "classic" => Some(Self {
                font_name: "Arial".into(),
                font_size: 64,
                primary_color: "#ffffff".into(),
                outline_color: "#000000".into(),
                background_color: "#000000".into(),
                bold: true,
                outline: 3.0,
                shadow: 1.0,
                position: CaptionPosition::Bottom,
                animation: CaptionAnimation::None,
            }),
            "tiktok" => Some(Self {
                font_name: "Montserrat".into(),
                font_size: 72,
                primary_color: "#ffffff".into(),
                outline_color: "#000000".into(),
                background_color: "#fe2c55".into(),
                bold: true,
                outline: 0.0,
                shadow: 0.0,
                position: CaptionPosition::Center,
                animation: CaptionAnimation::WordByWord,
            }),
            "minimal" => Some(Self {
                font_name: "Helvetica".into(),
                font_size: 52,
                primary_color: "#ffffff".into(),
                outline_color: "#222222".into(),
                background_color: "#000000".into(),
                bold: false,
                outline: 1.5,
                shadow: 0.0,
                position: CaptionPosition::Bottom,
                animation: CaptionAnimation::None,
            }),
            "bold_pop" => Some(Self {
                font_name: "Impact".into(),
                font_size: 84,
                primary_color: "#ffe600".into(),
                outline_color: "#000000".into(),
                background_color: "#000000".into(),
                bold: true,
                outline: 4.0,
                shadow: 2.0,
                position: CaptionPosition::Center,
                animation: CaptionAnimation::Pop,
            }),
            _ => None,
        }
    }
}

/// Slice full-video subtitles down to a clip and rebase times to zero.
/// Entries straddling an edge are clipped to it.
pub fn slice_entries(entries: &[SubtitleEntry], start_s: f64, end_s: f64) -> Vec<SubtitleEntry> {
    entries
        .iter()
        .filter(|e| e.end_s > start_s && e.start_s < end_s)
        .map(|e| SubtitleEntry {
            start_s: (e.start_s.max(start_s) - start_s).max(0.0),
            end_s: (e.end_s.min(end_s) - start_s).max(0.0),
            text: e.text.clone(),
        })
        .filter(|e| e.end_s > e.start_s)
        .collect()
}

/// Render entries into a complete ASS stylesheet sized for the output
/// canvas.
pub fn render_ass(entries: &[SubtitleEntry], style: &CaptionStyle, canvas: (u32, u32)) -> String {
    let (width, height) = canvas;
    let mut out = String::new();

    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    out.push_str(&format!("PlayResX: {width}\nPlayResY: {height}\n"));
    out.push_str("WrapStyle: 0\nScaledBorderAndShadow: yes\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    out.push_str(&format!(
        "Style: Default,{font},{size},{primary},{primary},{outline_c},{back},{bold},0,0,0,\
         100,100,0,0,1,{outline},{shadow},{align},40,40,80,1\n\n",
        font = style.font_name,
        size = style.font_size,
        primary = ass_color(&style.primary_color),
        outline_c = ass_color(&style.outline_color),
        back = ass_color(&style.background_color),
        bold = if style.bold { -1 } else { 0 },
        outline = style.outline,
        shadow = style.shadow,
        align = style.position.alignment(),
    ));

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");

    for entry in entries {
        match style.animation {
            CaptionAnimation::WordByWord => render_word_by_word(&mut out, entry, style),
            CaptionAnimation::Pop => {
                push_dialogue(
                    &mut out,
                    entry.start_s,
                    entry.end_s,
                    &format!(
                        "{{\\fad(100,50)\\t(0,120,\\fscx112\\fscy112)\\t(120,240,\\fscx100\\fscy100)}}{}",
                        escape_ass(&entry.text)
                    ),
                );
            }
            CaptionAnimation::None => {
                push_dialogue(&mut out, entry.start_s, entry.end_s, &escape_ass(&entry.text));
            }
        }
    }

    out
}

/// One dialogue event per word span, the active word highlighted in the
/// background color.
fn render_word_by_word(out: &mut String, entry: &SubtitleEntry, style: &CaptionStyle) {
    let words: Vec<&str> = entry.text.split_whitespace().collect();
    if words.is_empty() {
        return;
    }
    let total_chars: usize = words.iter().map(|w| w.len().max(1)).sum();
    let duration = (entry.end_s - entry.start_s).max(0.01);
    let highlight = ass_inline_color(&style.background_color);

    let mut cursor = entry.start_s;
    for (i, word) in words.iter().enumerate() {
        let span = duration * word.len().max(1) as f64 / total_chars as f64;
        let end = if i == words.len() - 1 {
            entry.end_s
        } else {
            cursor + span
        };

        let mut text = String::new();
        for (j, w) in words.iter().enumerate() {
            if j > 0 {
                text.push(' ');
            }
            if j == i {
                text.push_str(&format!("{{\\c{highlight}}}{}{{\\r}}", escape_ass(w)));
            } else {
                text.push_str(&escape_ass(w));
            }
        }
        push_dialogue(out, cursor, end, &text);
        cursor = end;
    }
}

fn push_dialogue(out: &mut String, start_s: f64, end_s: f64, text: &str) {
    out.push_str(&format!(
        "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
        format_ass_time(start_s),
        format_ass_time(end_s),
        text
    ));
}

/// `#RRGGBB` → ASS style-section `&HAABBGGRR` (alpha 00 = opaque).
fn ass_color(hex: &str) -> String {
    let (r, g, b) = parse_hex(hex);
    format!("&H00{b:02X}{g:02X}{r:02X}")
}

/// `#RRGGBB` → inline override form `&HBBGGRR&`.
fn ass_inline_color(hex: &str) -> String {
    let (r, g, b) = parse_hex(hex);
    format!("&H{b:02X}{g:02X}{r:02X}&")
}

fn parse_hex(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return (255, 255, 255);
    }
    let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).unwrap_or(255);
    (parse(0..2), parse(2..4), parse(4..6))
}

/// Escape characters ASS treats specially.
fn escape_ass(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "(")
        .replace('}', ")")
        .replace('\n', "\\N")
}
