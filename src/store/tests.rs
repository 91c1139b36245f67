use super::*;

fn fragment(text: &str, source: &str) -> Fragment {
    Fragment {
        text: text.to_string(),
        source: source.to_string(),
    }
}

#[test]
fn append_returns_first_id_of_batch() {
    let mut store = DocumentStore::new();

    assert!(store.is_empty());
    assert_eq!(store.append(vec![fragment("a", "x.pdf"), fragment("b", "x.pdf")]), 0);
    assert_eq!(store.append(vec![fragment("c", "y.pdf")]), 2);
    assert_eq!(store.len(), 3);
}

#[test]
fn get_is_positional() {
    let mut store = DocumentStore::new();
    store.append(vec![fragment("first", "a.pdf"), fragment("", "a.pdf")]);
    store.append(vec![fragment("third", "b.pdf")]);

    assert_eq!(store.get(0).map(|f| f.text.as_str()), Some("first"));
    assert_eq!(store.get(1).map(|f| f.text.as_str()), Some(""));
    assert_eq!(store.get(2).map(|f| f.source.as_str()), Some("b.pdf"));
    assert!(store.get(3).is_none());
}

#[test]
fn iter_yields_ids_in_order() {
    let mut store = DocumentStore::new();
    store.append(vec![fragment("a", "s"), fragment("b", "s"), fragment("c", "s")]);

    let ids: Vec<usize> = store.iter().map(|(id, _)| id).collect();

    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn sources_are_distinct_in_first_seen_order() {
    let mut store = DocumentStore::new();
    store.append(vec![fragment("a", "b.pdf"), fragment("b", "b.pdf")]);
    store.append(vec![fragment("c", "a.pdf")]);
    store.append(vec![fragment("d", "b.pdf")]);

    assert_eq!(store.sources(), vec!["b.pdf", "a.pdf"]);
}
