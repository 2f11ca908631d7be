/// Presentation model — what the overlay and the reset panel show.
///
/// Rendering is a pure function of the engine's query surface and the
/// display toggles. The presenter task here writes frames to stdout when
/// they change; a real host would draw them instead.
use crate::{config::TimerConfig, engine::NpcTimer, store::ConfigStore};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use tokio::sync::mpsc::Receiver;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayLine {
    pub left:  String,
    pub right: Option<String>,
}

impl OverlayLine {
    fn title(text: impl Into<String>) -> Self {
        Self { left: text.into(), right: None }
    }

    fn pair(left: &str, right: String) -> Self {
        Self { left: left.to_owned(), right: Some(right) }
    }
}

/// One overlay frame. An empty `lines` means the overlay is switched off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayFrame {
    pub in_combat: bool,
    pub lines:     Vec<OverlayLine>,
}

/// Reset buttons, one per configured name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelModel {
    pub reset_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Overlay(OverlayFrame),
    Panel(PanelModel),
}

/// `m:ss`, minutes unbounded.
pub fn format_time(ms: u64) -> String {
    let seconds = ms / 1_000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn render<S: ConfigStore>(timer: &NpcTimer<S>) -> OverlayFrame {
    let config = timer.config();
    let in_combat = timer.is_in_combat();
    if !config.npc_timer {
        return OverlayFrame { in_combat, lines: Vec::new() };
    }

    let Some(name) = timer.current_tracked_name() else {
        return OverlayFrame { in_combat, lines: vec![OverlayLine::title("No NPC selected")] };
    };

    let mut lines = vec![OverlayLine::title(name)];

    if config.show_current_kill_time && in_combat {
        let elapsed = timer.current_session_elapsed(timer.now_ms());
        lines.push(OverlayLine::pair("Current Time:", format_time(elapsed)));
    }

    if let Some(stats) = timer.stats_for(name) {
        if config.show_average_kill_time {
            if let Some(avg) = stats.average_kill_time() {
                lines.push(OverlayLine::pair("Average Time:", format_time(avg)));
            }
        }
        if config.show_total_kills {
            lines.push(OverlayLine::pair("Total Kills:", stats.kill_count.to_string()));
        }
        if config.show_personal_best {
            if let Some(best) = stats.personal_best() {
                lines.push(OverlayLine::pair("Personal Best:", format_time(best)));
            }
        }
    }

    OverlayFrame { in_combat, lines }
}

pub fn panel(config: &TimerConfig) -> PanelModel {
    PanelModel { reset_targets: config.tracked_names() }
}

fn write_overlay(out: &mut impl Write, frame: &OverlayFrame) -> std::io::Result<()> {
    if frame.lines.is_empty() {
        return writeln!(out, "[overlay hidden]");
    }
    for line in &frame.lines {
        match &line.right {
            Some(right) => writeln!(out, "  {:<16}{:>8}", line.left, right)?,
            None        => writeln!(out, "  {}", line.left)?,
        }
    }
    Ok(())
}

fn write_panel(out: &mut impl Write, panel: &PanelModel) -> std::io::Result<()> {
    if panel.reset_targets.is_empty() {
        return writeln!(out, "[panel] no NPCs configured");
    }
    for name in &panel.reset_targets {
        writeln!(out, "[panel] Reset {}", name)?;
    }
    Ok(())
}

/// Presenter task: print each frame that differs from the previous one.
pub async fn run(mut frame_rx: Receiver<Frame>) -> Result<()> {
    let mut last_overlay: Option<OverlayFrame> = None;

    while let Some(frame) = frame_rx.recv().await {
        let mut buf = Vec::new();
        match frame {
            Frame::Overlay(overlay) => {
                if last_overlay.as_ref() == Some(&overlay) {
                    continue;
                }
                write_overlay(&mut buf, &overlay)?;
                last_overlay = Some(overlay);
            }
            Frame::Panel(panel) => write_panel(&mut buf, &panel)?,
        }
        let mut out = std::io::stdout();
        out.write_all(&buf)?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Actor, GameEvent, NpcRef};
    use crate::store::MemoryConfigStore;

    fn timer(config: TimerConfig) -> NpcTimer<MemoryConfigStore> {
        NpcTimer::new(config, MemoryConfigStore::new())
    }

    fn tracked_cow() -> TimerConfig {
        TimerConfig { npcs_to_track: "Cow".into(), ..TimerConfig::default() }
    }

    fn cow() -> NpcRef {
        NpcRef { index: 4, name: Some("Cow".into()) }
    }

    fn engage(t: &mut NpcTimer<MemoryConfigStore>, ts: u64) {
        t.dispatch(&GameEvent::InteractingChanged {
            timestamp_ms: ts,
            source:       Actor::LocalPlayer,
            target:       Some(Actor::Npc(cow())),
        });
    }

    fn lefts(frame: &OverlayFrame) -> Vec<&str> {
        frame.lines.iter().map(|l| l.left.as_str()).collect()
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(2_050), "0:02");
        assert_eq!(format_time(61_999), "1:01");
        assert_eq!(format_time(3_600_000), "60:00");
    }

    #[test]
    fn idle_shows_placeholder() {
        let frame = render(&timer(tracked_cow()));
        assert_eq!(lefts(&frame), vec!["No NPC selected"]);
        assert!(!frame.in_combat);
    }

    #[test]
    fn disabled_overlay_has_no_lines() {
        let mut t = timer(TimerConfig { npc_timer: false, ..tracked_cow() });
        engage(&mut t, 0);
        assert!(render(&t).lines.is_empty());
    }

    #[test]
    fn first_fight_shows_name_timer_and_zero_kills_hidden() {
        let mut t = timer(tracked_cow());
        engage(&mut t, 1_000);
        t.dispatch(&GameEvent::Tick { timestamp_ms: 4_600 });

        let frame = render(&t);
        assert!(frame.in_combat);
        assert_eq!(lefts(&frame), vec!["Cow", "Current Time:"]);
        assert_eq!(frame.lines[1].right.as_deref(), Some("0:03"));
    }

    #[test]
    fn stats_lines_follow_toggles() {
        let mut t = timer(tracked_cow());
        engage(&mut t, 0);
        t.dispatch(&GameEvent::LootReceived { timestamp_ms: 65_000, npc: cow() });
        engage(&mut t, 70_000);

        let frame = render(&t);
        assert_eq!(
            lefts(&frame),
            vec!["Cow", "Current Time:", "Average Time:", "Total Kills:", "Personal Best:"]
        );
        assert_eq!(frame.lines[2].right.as_deref(), Some("1:05"));
        assert_eq!(frame.lines[3].right.as_deref(), Some("1"));

        t.apply_config(TimerConfig {
            show_current_kill_time: false,
            show_average_kill_time: false,
            show_personal_best:     false,
            ..tracked_cow()
        });
        assert_eq!(lefts(&render(&t)), vec!["Cow", "Total Kills:"]);
    }

    #[test]
    fn panel_lists_configured_names() {
        let cfg = TimerConfig { npcs_to_track: " Cow , , Giant Rat".into(), ..TimerConfig::default() };
        assert_eq!(panel(&cfg).reset_targets, vec!["Cow", "Giant Rat"]);
    }

    #[test]
    fn writes_overlay_text() {
        let frame = OverlayFrame {
            in_combat: true,
            lines: vec![
                OverlayLine::title("Cow"),
                OverlayLine::pair("Total Kills:", "3".into()),
            ],
        };
        let mut buf = Vec::new();
        write_overlay(&mut buf, &frame).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("  Cow\n"));
        assert!(text.contains("Total Kills:"));
        assert!(text.trim_end().ends_with('3'));
    }
}
