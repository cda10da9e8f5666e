use comfy_table::{presets::NOTHING, *};
use genmix::chart::{Chart, ChartMetric};
use genmix::groups::GroupConfig;
use genmix::sources::color_map;
use genmix::view::ViewTable;
use itertools::Itertools;

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// `#rrggbb` to a terminal colour.
fn hex_to_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

fn value_cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) => Cell::new(format!("{v:.2}")).set_alignment(CellAlignment::Right),
        None => Cell::new(""),
    }
}

/// Positive changes in green, negative in red, gaps left blank.
fn change_cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) if v > 0.0 => value_cell(Some(v)).fg(Color::Green),
        Some(v) if v < 0.0 => value_cell(Some(v)).fg(Color::Red),
        other => value_cell(other),
    }
}

pub fn display_view(view: &ViewTable, max_results: Option<usize>) -> anyhow::Result<()> {
    let rows = view.rows()?;
    let mut table = styled_table();
    table.set_header(header(&[
        "Entity",
        "Date",
        "Source",
        "Generation (TWh)",
        "Share (%)",
        "YoY (%)",
        "BOY (%)",
    ]));
    for row in rows.iter().take(max_results.unwrap_or(usize::MAX)) {
        table.add_row(vec![
            Cell::new(&row.entity),
            Cell::new(&row.date),
            Cell::new(&row.source),
            value_cell(Some(row.generation)),
            value_cell(row.share_pct),
            change_cell(row.yoy_pct),
            change_cell(row.boy_pct),
        ]);
    }
    println!("\n{}", table);
    if let Some(max) = max_results {
        if rows.len() > max {
            println!("Showing {max} of {} rows. Use `--full` to show all.", rows.len());
        }
    }
    Ok(())
}

/// Sort key for `MM-YYYY` and `YYYY` labels.
fn label_key(label: &str) -> (i32, u32) {
    match label.split_once('-') {
        Some((month, year)) => (year.parse().unwrap_or(0), month.parse().unwrap_or(0)),
        None => (label.parse().unwrap_or(0), 0),
    }
}

/// One column per source, one row per date.
pub fn display_chart(chart: &Chart) -> anyhow::Result<()> {
    let metric = match chart.metric {
        ChartMetric::Share => "Share of generation (%)",
        ChartMetric::Yoy => "Year-over-year change (%)",
    };
    println!(
        "\n{} for {} (y axis {:.2} to {:.2})",
        metric, chart.entity, chart.y_range.0, chart.y_range.1
    );

    let dates: Vec<&str> = chart
        .series
        .iter()
        .flat_map(|s| s.points.iter().map(|(date, _)| date.as_str()))
        .unique()
        .sorted_by_key(|date| label_key(date))
        .collect();

    let mut table = styled_table();
    let mut columns = vec![Cell::new("Date").add_attribute(Attribute::Bold)];
    columns.extend(chart.series.iter().map(|s| {
        let cell = Cell::new(s.source.as_str()).add_attribute(Attribute::Bold);
        match hex_to_color(s.color) {
            Some(color) => cell.fg(color),
            None => cell,
        }
    }));
    table.set_header(columns);
    for date in dates {
        let mut row = vec![Cell::new(date)];
        row.extend(chart.series.iter().map(|s| {
            let value = s
                .points
                .iter()
                .find(|(d, _)| d == date)
                .and_then(|(_, v)| *v);
            match chart.metric {
                ChartMetric::Share => value_cell(value),
                ChartMetric::Yoy => change_cell(value),
            }
        }));
        table.add_row(row);
    }
    println!("{}", table);
    Ok(())
}

/// Sources in plotting order with their colour and the source sets they belong to.
pub fn display_sources(groups: &GroupConfig) -> anyhow::Result<()> {
    let mut table = styled_table();
    table.set_header(header(&["Source", "Colour", "Groups"]));
    for (source, color) in color_map() {
        let member_of = groups
            .source_sets()
            .filter(|(_, members)| members.contains(&source))
            .map(|(name, _)| name)
            .join(", ");
        let swatch = match hex_to_color(color) {
            Some(c) => Cell::new(color).fg(c),
            None => Cell::new(color),
        };
        table.add_row(vec![Cell::new(source.as_str()), swatch, Cell::new(member_of)]);
    }
    println!("\n{}", table);
    Ok(())
}
