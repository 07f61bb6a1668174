//! HTML table to JSON rows.
//!
//! Header rows (`<th>`) are laid out on a grid honoring `colspan` and
//! `rowspan`; stacked header cells are joined with `_`, so a "Dec-2025"
//! group over an "AUM (Cr)" column becomes `Dec-2025_AUM (Cr)`. Cells that
//! contain a link become `{ "text", "href" }` objects.

use scraper::{ElementRef, Selector};
use serde_json::{Map, Value};

use crate::error::{FetchError, FetchResult};

fn selector(css: &str) -> FetchResult<Selector> {
    Selector::parse(css).map_err(|e| FetchError::Parse {
        message: format!("invalid selector: {e}"),
        raw: css.to_string(),
    })
}

fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn span(element: ElementRef<'_>, attr: &str) -> usize {
    element
        .value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Convert the first `<table>` at or under `root` into JSON rows.
pub fn table_to_json(root: ElementRef<'_>) -> FetchResult<Value> {
    let table_sel = selector("table")?;
    let table = if root.value().name() == "table" {
        root
    } else {
        root.select(&table_sel)
            .next()
            .ok_or_else(|| FetchError::NotFound("no table found".to_string()))?
    };

    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;
    let link_sel = selector("[href]")?;
    let any_sel = selector("*")?;

    let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
    let header_rows: Vec<_> = rows.iter().filter(|r| r.select(&th_sel).next().is_some()).collect();
    let body_rows: Vec<_> = rows.iter().filter(|r| r.select(&td_sel).next().is_some()).collect();

    // Lay header cells onto a grid
    let mut grid: Vec<Vec<Option<String>>> = Vec::new();
    for (row_index, row) in header_rows.iter().enumerate() {
        let mut col = 0;
        for cell in row.select(&th_sel) {
            let text = clean_text(cell);
            let colspan = span(cell, "colspan");
            let rowspan = span(cell, "rowspan");

            while grid
                .get(row_index)
                .and_then(|r| r.get(col))
                .is_some_and(Option::is_some)
            {
                col += 1;
            }

            for r in row_index..row_index + rowspan {
                if grid.len() <= r {
                    grid.resize_with(r + 1, Vec::new);
                }
                let grid_row = &mut grid[r];
                if grid_row.len() < col + colspan {
                    grid_row.resize(col + colspan, None);
                }
                for slot in &mut grid_row[col..col + colspan] {
                    *slot = Some(text.clone());
                }
            }
            col += colspan;
        }
    }

    let width = grid.first().map_or(0, Vec::len);
    let headers: Vec<String> = (0..width)
        .map(|c| {
            let mut path: Vec<&str> = Vec::new();
            for row in &grid {
                if let Some(Some(text)) = row.get(c) {
                    if !text.is_empty() && !path.contains(&text.as_str()) {
                        path.push(text);
                    }
                }
            }
            path.join("_")
        })
        .collect();

    let mut out = Vec::with_capacity(body_rows.len());
    for row in body_rows {
        let mut record = Map::new();
        for (i, cell) in row.select(&td_sel).enumerate() {
            let header = headers
                .get(i)
                .filter(|h| !h.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("column_{i}"));

            let link = cell.select(&link_sel).next();
            let mut text = clean_text(cell);
            if let Some(link) = link {
                // Busy cells carry icon text; prefer the link's own text
                if cell.select(&any_sel).count() > 3 {
                    text = clean_text(link);
                }
            }

            let value = match link.and_then(|l| l.value().attr("href")) {
                Some(href) => serde_json::json!({ "text": text, "href": href }),
                None => Value::String(text),
            };
            record.insert(header, value);
        }
        out.push(Value::Object(record));
    }

    Ok(Value::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn convert(html: &str) -> Value {
        let doc = Html::parse_fragment(html);
        let table = doc.select(&selector("table").unwrap()).next().unwrap();
        table_to_json(table).unwrap()
    }

    #[test]
    fn test_flattens_grouped_headers() {
        let value = convert(
            r#"<table>
                <tr><th rowspan="2">Fund</th><th colspan="2">Dec-2025</th></tr>
                <tr><th>AUM (Cr)</th><th>Shares</th></tr>
                <tr><td><a href="/mf/1">Alpha Fund</a></td><td>1,200</td><td> 30 </td></tr>
            </table>"#,
        );

        assert_eq!(
            value,
            serde_json::json!([{
                "Fund": { "text": "Alpha Fund", "href": "/mf/1" },
                "Dec-2025_AUM (Cr)": "1,200",
                "Dec-2025_Shares": "30",
            }])
        );
    }

    #[test]
    fn test_missing_headers_use_column_index() {
        let value = convert("<table><tr><td>a</td><td>b</td></tr></table>");
        assert_eq!(value, serde_json::json!([{ "column_0": "a", "column_1": "b" }]));
    }
}
