use crate::domain::Rule;

const HEADERS: [&str; 5] = ["NAME", "NAMESPACE", "IMAGE", "ANNOTATIONS", "ALLOWED"];
const NONE: &str = "<none>";

/// Render rules as a borderless table.
///
/// Images and annotations are listed one per line within their row.
pub fn render_table(rules: &[Rule]) -> String {
    let rows: Vec<[Vec<String>; 5]> = rules.iter().map(row_cells).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (column, cell) in row.iter().enumerate() {
            for line in cell {
                widths[column] = widths[column].max(line.len());
            }
        }
    }

    let mut out = String::new();
    push_line(&mut out, &widths, &HEADERS.map(String::from));

    for row in &rows {
        let height = row.iter().map(Vec::len).max().unwrap_or(1);
        for index in 0..height {
            let line = [0, 1, 2, 3, 4].map(|column| {
                row[column].get(index).cloned().unwrap_or_default()
            });
            push_line(&mut out, &widths, &line);
        }
    }

    out
}

fn row_cells(rule: &Rule) -> [Vec<String>; 5] {
    let annotations = if rule.annotations.is_empty() {
        vec![format!("{}={}", NONE, NONE)]
    } else {
        rule.annotations
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    };

    let images = if rule.image_patterns.is_empty() {
        vec![NONE.to_string()]
    } else {
        rule.image_patterns.clone()
    };

    [
        vec![rule.name.clone()],
        vec![rule.namespace.clone()],
        images,
        annotations,
        vec![rule.allowed.to_string()],
    ]
}

fn push_line(out: &mut String, widths: &[usize; 5], cells: &[String; 5]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("   ");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Render one rule as YAML.
pub fn render_yaml(rule: &Rule) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(rule)
}
