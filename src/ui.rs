use crate::app::NowPlaying;
use crate::decoder::Decoder;
use crate::model::{Rgb, file_stem_title};
use crate::session::PlayerSession;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use std::time::Duration;

const APP_TITLE: &str = "Aurion  ";
const WAVEFORM_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

const BG: Color = Color::Rgb(10, 15, 24);
const PANEL_BG: Color = Color::Rgb(19, 29, 43);
const PANEL_ALT_BG: Color = Color::Rgb(24, 38, 58);
const TEXT: Color = Color::Rgb(214, 228, 248);
const MUTED: Color = Color::Rgb(149, 173, 204);
const ALERT: Color = Color::Rgb(249, 174, 88);
const SELECTED_BG: Color = Color::Rgb(34, 55, 82);

pub fn draw<D: Decoder>(frame: &mut Frame, session: &PlayerSession<D>, view: &NowPlaying) {
    let accent = tint(view.color);
    frame.render_widget(Block::default().style(Style::default().bg(BG)), frame.area());

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE,
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("Tracks {}", session.queue().len()),
            Style::default().fg(TEXT),
        ),
        Span::styled("  |  ", Style::default().fg(MUTED)),
        Span::styled(
            format!(
                "Shuffle {}  Repeat {}  Crossfade {}s",
                if session.shuffle_enabled() { "on" } else { "off" },
                session.repeat_mode().label(),
                session.crossfade_seconds()
            ),
            Style::default().fg(ALERT),
        ),
        Span::styled("  |  ", Style::default().fg(MUTED)),
        Span::styled(
            format!("Left {}", format_duration(session.remaining_time())),
            Style::default().fg(MUTED),
        ),
    ]))
    .block(panel_block("Status", PANEL_BG, TEXT, accent));
    frame.render_widget(header, vertical[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(vertical[1]);

    let playing_index = view.index;
    let items: Vec<ListItem> = session
        .queue()
        .tracks()
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let marker = if playing_index == Some(index) { "  > " } else { "    " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(accent)),
                Span::styled(file_stem_title(path), Style::default().fg(TEXT)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select((!items.is_empty()).then_some(view.selected));
    let list = List::new(items)
        .block(panel_block("Playlist", PANEL_BG, TEXT, accent))
        .highlight_style(
            Style::default()
                .bg(SELECTED_BG)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, body[0], &mut state);

    let queue_position = view
        .index
        .map(|index| format!("{}/{}", index + 1, session.queue().len()))
        .unwrap_or_else(|| format!("-/{}", session.queue().len()));
    let art = view
        .artwork
        .as_ref()
        .map(|artwork| format!("{}x{}", artwork.width(), artwork.height()))
        .unwrap_or_else(|| String::from("none"));
    let info_text = vec![
        Line::from(vec![
            Span::styled("Now", Style::default().fg(accent).add_modifier(Modifier::BOLD)),
            Span::styled(format!("  {}", view.title), Style::default().fg(TEXT)),
        ]),
        Line::from(Span::styled(
            format!("Artist  {}", view.artist),
            Style::default().fg(MUTED),
        )),
        Line::from(Span::styled(
            format!("Queue   {queue_position}"),
            Style::default().fg(ALERT),
        )),
        Line::from(Span::styled(format!("Art     {art}"), Style::default().fg(MUTED))),
        Line::from(""),
        Line::from(Span::styled("        ", Style::default().bg(accent))),
    ];
    let info = Paragraph::new(info_text)
        .block(panel_block("Now Playing", PANEL_ALT_BG, TEXT, accent))
        .wrap(Wrap { trim: true });
    frame.render_widget(info, body[1]);

    let ratio = progress_ratio(view.position, view.duration);
    let wave_width = usize::from(vertical[2].width.saturating_sub(2));
    let wave = Paragraph::new(Span::styled(
        waveform_line(&view.waveform, wave_width),
        Style::default().fg(accent),
    ))
    .block(panel_block("Waveform", PANEL_BG, TEXT, accent));
    frame.render_widget(wave, vertical[2]);

    let timeline = Paragraph::new(Span::styled(
        timeline_line(view, ratio, session.volume(), session.is_fading()),
        Style::default().fg(TEXT),
    ))
    .block(panel_block("Timeline", PANEL_BG, TEXT, accent))
    .wrap(Wrap { trim: true });
    frame.render_widget(timeline, vertical[3]);

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(
            "Keys: space play/pause, n next, b previous, Enter play, s shuffle, r repeat, [ ] crossfade, q quit",
            Style::default().fg(MUTED),
        ),
        Span::styled("  |  ", Style::default().fg(MUTED)),
        Span::styled(view.status.as_str(), Style::default().fg(TEXT)),
    ]))
    .block(panel_block("Message", PANEL_BG, TEXT, accent));
    frame.render_widget(footer, vertical[4]);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn tint(color: Rgb) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

fn progress_ratio(position: Duration, duration: Option<Duration>) -> Option<f64> {
    duration.and_then(|duration| {
        let total_secs = duration.as_secs_f64();
        (total_secs > 0.0).then_some((position.as_secs_f64() / total_secs).clamp(0.0, 1.0))
    })
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn waveform_line(values: &[f32], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    (0..width)
        .map(|column| {
            let start = column * values.len() / width;
            let end = ((column + 1) * values.len() / width).max(start + 1).min(values.len());
            let peak = values[start.min(values.len() - 1)..end]
                .iter()
                .copied()
                .fold(0.0_f32, f32::max)
                .clamp(0.0, 1.0);
            let level = (peak * (WAVEFORM_LEVELS.len() - 1) as f32).round() as usize;
            WAVEFORM_LEVELS[level]
        })
        .collect()
}

fn timeline_line(view: &NowPlaying, ratio: Option<f64>, volume: u8, fading: bool) -> String {
    format!(
        "{} {} / {} {}  |  Vol {} {:>3}%{}",
        if view.playing { ">" } else { "||" },
        format_duration(view.position),
        view.duration
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, 26),
        progress_bar(Some(f64::from(volume) / 100.0), 14),
        volume,
        if fading { "  fading" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_as_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(format_duration(Duration::from_secs(185)), "03:05");
    }

    #[test]
    fn progress_bar_clamps_ratio() {
        assert_eq!(progress_bar(Some(0.5), 4), "[##--]");
        assert_eq!(progress_bar(Some(3.0), 4), "[####]");
        assert_eq!(progress_bar(None, 3), "[---]");
    }

    #[test]
    fn ratio_needs_a_known_duration() {
        assert_eq!(progress_ratio(Duration::from_secs(5), None), None);
        assert_eq!(
            progress_ratio(Duration::from_secs(5), Some(Duration::ZERO)),
            None
        );
        assert_eq!(
            progress_ratio(Duration::from_secs(5), Some(Duration::from_secs(10))),
            Some(0.5)
        );
    }

    #[test]
    fn waveform_line_fits_width_and_uses_peaks() {
        let values = [0.0, 1.0, 0.0, 0.0, 0.5, 0.0];
        let line = waveform_line(&values, 3);
        assert_eq!(line.chars().collect::<Vec<_>>(), vec!['█', '▁', '▅']);
        assert_eq!(waveform_line(&values, 10).chars().count(), 10);
        assert_eq!(waveform_line(&[], 10), "");
    }
}
