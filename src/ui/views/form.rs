//! The create/edit product form.

use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::{App, FormFocus};
use crate::ui::styles;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let editing = app.form.editing.is_some();
    let title = if editing {
        " Edit Product "
    } else {
        " New Product "
    };

    let mut lines = vec![Line::from("")];

    lines.push(field_line(
        "Name      ",
        &app.form.name,
        app.form_focus == FormFocus::Name,
    ));
    lines.push(Line::from(""));
    lines.push(field_line(
        "Inventory ",
        &app.form.inventory,
        app.form_focus == FormFocus::Inventory,
    ));
    lines.push(Line::from(""));
    lines.push(field_line(
        "Price     ",
        &app.form.price,
        app.form_focus == FormFocus::Price,
    ));
    lines.push(Line::from(""));
    lines.push(field_line(
        "Image file",
        &app.form.image_path,
        app.form_focus == FormFocus::Image,
    ));
    lines.push(Line::from(Span::styled(
        if editing {
            "            PNG or JPEG - leave blank to keep the current image"
        } else {
            "            PNG or JPEG - path to a local file"
        },
        styles::muted_style(),
    )));
    lines.push(Line::from(""));

    let button_label = match (app.form.submitting, editing) {
        (true, _) => "  Saving...  ",
        (false, true) => "    Save     ",
        (false, false) => "   Create    ",
    };
    let button_focused = app.form_focus == FormFocus::Button;
    lines.push(Line::from(vec![
        Span::raw("  "),
        Span::styled(
            format!("[{}]", button_label),
            if button_focused {
                styles::selected_style()
            } else {
                styles::list_item_style()
            },
        ),
        Span::styled("   Esc to cancel, Tab to move between fields", styles::muted_style()),
    ]));

    if let Some(ref error) = app.form.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            styles::error_style(),
        )));
    }

    let block = Block::default()
        .title(title)
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn field_line<'a>(label: &'a str, value: &'a str, focused: bool) -> Line<'a> {
    let cursor = if focused { "▌" } else { "" };
    let value_style = if focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    Line::from(vec![
        Span::raw("  "),
        Span::styled(label, styles::muted_style()),
        Span::styled(" [", styles::muted_style()),
        Span::styled(format!("{}{}", value, cursor), value_style),
        Span::styled("]", styles::muted_style()),
    ])
}
