use warp::{
    http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE},
    reply::Response,
    Reply,
};

use crate::{
    constants::{SHOPPING_LIST_CLOSING, SHOPPING_LIST_FILENAME, SHOPPING_LIST_TITLE},
    error::Error,
    schema::{Id, ShoppingListEntry},
    store::Store,
};

/// Cart ingredients summed per (name, unit), sorted by name then unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    entries: Vec<ShoppingListEntry>,
}

impl ShoppingList {
    pub fn new(mut entries: Vec<ShoppingListEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
        });

        // Backends already group, this only guards the one-line-per-group rule.
        let mut merged: Vec<ShoppingListEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match merged.last_mut() {
                Some(last)
                    if last.name == entry.name
                        && last.measurement_unit == entry.measurement_unit =>
                {
                    last.amount += entry.amount;
                }
                _ => merged.push(entry),
            }
        }

        Self { entries: merged }
    }

    pub fn entries(&self) -> &[ShoppingListEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().enumerate().map(|(i, entry)| {
            format!(
                "{}. {} ({}) - {}",
                i + 1,
                entry.name,
                entry.measurement_unit,
                entry.amount
            )
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::from(SHOPPING_LIST_TITLE);
        out.push_str("\n\n");
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(SHOPPING_LIST_CLOSING);
        out.push('\n');
        out
    }
}

pub async fn shopping_list<S: Store>(store: &S, user_id: Id) -> Result<ShoppingList, Error> {
    Ok(ShoppingList::new(store.cart_totals(user_id).await?))
}

pub async fn render_shopping_list<S: Store>(store: &S, user_id: Id) -> Result<String, Error> {
    let list = shopping_list(store, user_id).await?;
    log::trace!("> Rendered {} shopping list lines for {user_id}", list.entries.len());
    Ok(list.render())
}

/// Plain-text download of a rendered list.
pub fn shopping_list_reply(text: String) -> Response {
    let mut response = text.into_response();
    let headers = response.headers_mut();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""))
    {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, unit: &str, amount: i64) -> ShoppingListEntry {
        ShoppingListEntry {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn sorts_by_name_then_unit() {
        let list = ShoppingList::new(vec![
            entry("salt", "g", 5),
            entry("Sugar", "g", 100),
            entry("milk", "ml", 200),
            entry("milk", "cup", 1),
        ]);

        let lines: Vec<String> = list.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1. Sugar (g) - 100",
                "2. milk (cup) - 1",
                "3. milk (ml) - 200",
                "4. salt (g) - 5",
            ]
        );
    }

    #[test]
    fn merges_repeated_groups() {
        let list = ShoppingList::new(vec![entry("Salt", "g", 5), entry("Salt", "g", 10)]);
        assert_eq!(list.entries(), &[entry("Salt", "g", 15)]);
    }

    #[test]
    fn empty_list_keeps_title_and_closing() {
        let text = ShoppingList::new(vec![]).render();

        assert!(text.starts_with(SHOPPING_LIST_TITLE));
        assert!(text.trim_end().ends_with(SHOPPING_LIST_CLOSING));
        assert_eq!(text.lines().filter(|l| l.contains(". ")).count(), 0);
    }

    #[test]
    fn render_layout() {
        let text = ShoppingList::new(vec![entry("Salt", "g", 15)]).render();
        assert_eq!(
            text,
            format!("{SHOPPING_LIST_TITLE}\n\n1. Salt (g) - 15\n\n{SHOPPING_LIST_CLOSING}\n")
        );
    }

    #[tokio::test]
    async fn reply_is_an_attachment() {
        let response = shopping_list_reply(String::from("SHOPPING LIST\n"));

        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"shopping_list.txt\""
        );

        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"SHOPPING LIST\n");
    }
}
