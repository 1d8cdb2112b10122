//! The product listing: a paginated table with a detail panel.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::app::App;
use crate::ui::styles;
use crate::utils::{format_inventory, format_price, truncate};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    render_table(frame, app, chunks[0]);
    render_detail(frame, app, chunks[1]);
}

fn render_table(frame: &mut Frame, app: &App, area: Rect) {
    let products = app.filtered_products();

    let header_cells = ["Name", "Inventory", "Price", ""]
        .iter()
        .map(|h| Cell::from(*h).style(styles::title_style()));
    let header = Row::new(header_cells).height(1);

    let rows = products.iter().map(|product| {
        let mine = if product.is_owned_by(app.user_id.as_deref()) {
            "mine"
        } else {
            ""
        };
        let row_style = if product.is_available() {
            styles::list_item_style()
        } else {
            styles::out_of_stock_style()
        };
        Row::new(vec![
            Cell::from(truncate(&product.name, 28)),
            Cell::from(format_inventory(product.inventory)),
            Cell::from(format_price(product.price)),
            Cell::from(Span::styled(mine, styles::highlight_style())),
        ])
        .style(row_style)
    });

    let title = if app.search_query.is_empty() {
        format!(
            " Products ({} of {}) - page {}/{} ",
            products.len(),
            app.total_products,
            app.page,
            app.total_pages()
        )
    } else {
        format!(" Products matching \"{}\" ({}) ", app.search_query, products.len())
    };

    let widths = [
        Constraint::Min(20),
        Constraint::Length(14),
        Constraint::Length(10),
        Constraint::Length(5),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::title_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(true)),
        )
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if !products.is_empty() {
        state.select(Some(app.selection.min(products.len() - 1)));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    if app.is_loading {
        lines.push(Line::from(Span::styled("Loading...", styles::muted_style())));
    } else if let Some(product) = app.selected_product() {
        lines.push(Line::from(Span::styled(
            product.name.clone(),
            styles::title_style(),
        )));
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Price:     ", styles::muted_style()),
            Span::styled(format_price(product.price), styles::highlight_style()),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Inventory: ", styles::muted_style()),
            if product.is_available() {
                Span::styled(format_inventory(product.inventory), styles::success_style())
            } else {
                Span::styled("out of stock", styles::error_style())
            },
        ]));
        lines.push(Line::from(""));
        match product.image_path.as_deref() {
            Some(url) => {
                lines.push(Line::from(Span::styled("Image", styles::muted_style())));
                lines.push(Line::from(Span::styled(
                    truncate(url, area.width.saturating_sub(4) as usize),
                    styles::list_item_style(),
                )));
            }
            None => {
                lines.push(Line::from(Span::styled("No image", styles::muted_style())));
            }
        }
        if product.is_owned_by(app.user_id.as_deref()) {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Created by you - [e]dit, [x] delete",
                styles::muted_style(),
            )));
        }
    } else if app.products.is_empty() {
        lines.push(Line::from(Span::styled(
            "No products yet",
            styles::muted_style(),
        )));
        if app.user_is_authenticated {
            lines.push(Line::from(Span::styled(
                "Press [n] to add the first one",
                styles::muted_style(),
            )));
        }
    }

    let block = Block::default()
        .title(" Detail ")
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}
