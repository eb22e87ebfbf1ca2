use shared::domain::TodoItem;

/// One line per item: checkbox, name, identity and version.
pub fn render_items(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "(no items)\n".to_string();
    }
    items
        .iter()
        .map(|item| {
            let mark = if item.status.is_done() { 'x' } else { ' ' };
            format!("[{mark}] {} (#{}, v{})\n", item.name, item.id, item.version)
        })
        .collect()
}
