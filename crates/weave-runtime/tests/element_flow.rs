use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::json;
use tracing_test::traced_test;
use weave_core::{Children, Item, NodeCx, Record, TransitionConfig, Value, WeaveError};
use weave_dom::{CallbackResult, Document, EventCx, NodeId};
use weave_runtime::{Element, ElementConfig, FrameLoop, Scope};

fn mount(config: ElementConfig) -> (Rc<RefCell<Document>>, FrameLoop, Element) {
    let doc = Rc::new(RefCell::new(Document::new()));
    let root = doc.borrow_mut().create_element("div");
    let frames = FrameLoop::new();
    let el = Element::with_config(Rc::clone(&doc), root, Rc::new(frames.clone()), config);
    (doc, frames, el)
}

fn kids(doc: &Rc<RefCell<Document>>, node: NodeId) -> Vec<NodeId> {
    doc.borrow().children(node).to_vec()
}

fn literals(items: &[&str]) -> Children {
    Children::Literals(items.iter().map(|s| Value::from(*s)).collect())
}

// ---------------------------------------------------------------------------
// Field writes
// ---------------------------------------------------------------------------

#[test]
fn paragraph_text_is_rewritten() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("p").text("a")]);
    frames.run_frame();
    let p = kids(&doc, el.root())[0];

    el.data().at(0).unwrap().set_text("b").unwrap();
    frames.run_frame();
    assert_eq!(doc.borrow().text_content(p), "b");
    assert_eq!(kids(&doc, el.root()), vec![p]);
}

#[test]
fn nested_text_write_keeps_sibling_identity() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("ul").children([
        Record::new("li").text("1"),
        Record::new("li").text("2"),
    ])]);
    frames.run_frame();
    let ul = kids(&doc, el.root())[0];
    let before = kids(&doc, ul);

    let first = el.data().at(0).unwrap().children().at(0).unwrap();
    first.set_text("x").unwrap();
    frames.run_frame();

    let after = kids(&doc, ul);
    assert_eq!(doc.borrow().text_content(ul), "x2");
    assert_eq!(after[1], before[1]);
    assert_eq!(after[0], before[0]);
}

#[test]
fn deep_write_keeps_every_ancestor() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("section").child(
        Record::new("ul").children([Record::new("li").text("1"), Record::new("li").text("2")]),
    )]);
    frames.run_frame();
    let section = kids(&doc, el.root())[0];
    let ul = kids(&doc, section)[0];
    let items = kids(&doc, ul);

    let ul_data = el.data().at(0).unwrap().children().at(0).unwrap();
    ul_data.children().at(1).unwrap().set_text("two").unwrap();
    ul_data.set_attr("class", "list").unwrap();
    frames.run_frame();

    assert_eq!(kids(&doc, el.root()), vec![section]);
    assert_eq!(kids(&doc, section), vec![ul]);
    assert_eq!(kids(&doc, ul), items);
    assert_eq!(doc.borrow().text_content(ul), "1two");
    assert_eq!(doc.borrow().attr(ul, "class"), Some("list"));
    assert_eq!(el.last_stats().unwrap().replaced, 0);
}

#[test]
fn write_to_a_replaced_record_is_discarded() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("p").text("old")]);
    frames.run_frame();

    let old = el.data().at(0).unwrap();
    old.set_attr("title", "from old").unwrap();
    el.data().set(0, Record::new("p").text("new")).unwrap();
    frames.run_frame();

    let node = kids(&doc, el.root())[0];
    assert_eq!(doc.borrow().attr(node, "title"), None);
    assert_eq!(doc.borrow().text_content(node), "new");
    assert!(el.last_stats().unwrap().stale > 0);
}

#[test]
fn same_field_keeps_last_write() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("p")]);
    frames.run_frame();
    let p = el.data().at(0).unwrap();
    for text in ["one", "two", "three"] {
        p.set_text(text).unwrap();
    }
    p.set_attr("title", "a").unwrap();
    p.set_attr("title", "b").unwrap();
    frames.run_frame();

    let doc = doc.borrow();
    let node = doc.children(el.root())[0];
    assert_eq!(doc.text_content(node), "three");
    assert_eq!(doc.attr(node, "title"), Some("b"));
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Text(u8),
    Title(u8),
    Class(u8),
    Color(u8),
}

fn arb_write() -> impl Strategy<Value = Write> {
    prop_oneof![
        any::<u8>().prop_map(Write::Text),
        any::<u8>().prop_map(Write::Title),
        any::<u8>().prop_map(Write::Class),
        any::<u8>().prop_map(Write::Color),
    ]
}

proptest! {
    #[test]
    fn distinct_fields_reflect_their_last_write(writes in proptest::collection::vec(arb_write(), 1..24)) {
        let (doc, frames, el) = mount(ElementConfig::default());
        el.set_data(vec![Record::new("p")]);
        frames.run_frame();
        let p = el.data().at(0).unwrap();

        let mut text = None;
        let mut title = None;
        let mut class = None;
        let mut color = None;
        for write in &writes {
            match *write {
                Write::Text(v) => {
                    p.set_text(format!("t{v}")).unwrap();
                    text = Some(format!("t{v}"));
                }
                Write::Title(v) => {
                    p.set_attr("title", format!("a{v}")).unwrap();
                    title = Some(format!("a{v}"));
                }
                Write::Class(v) => {
                    p.set_attr("class", format!("c{v}")).unwrap();
                    class = Some(format!("c{v}"));
                }
                Write::Color(v) => {
                    p.set_style("color", format!("s{v}")).unwrap();
                    color = Some(format!("s{v}"));
                }
            }
        }
        frames.run_frame();

        let doc = doc.borrow();
        let node = doc.children(el.root())[0];
        if let Some(text) = text {
            prop_assert_eq!(doc.text_content(node), text);
        }
        prop_assert_eq!(doc.attr(node, "title"), title.as_deref());
        prop_assert_eq!(doc.attr(node, "class"), class.as_deref());
        prop_assert_eq!(doc.style(node, "color"), color.as_deref());
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[test]
fn replacement_creates_a_new_node_and_leaves_siblings() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![
        Record::new("p").text("a"),
        Record::new("p").text("b"),
        Record::new("p").text("c"),
    ]);
    frames.run_frame();
    let before = kids(&doc, el.root());
    let first_binding = el.binding_of(before[0]).unwrap();

    el.data().set(1, Record::new("span").text("x")).unwrap();
    frames.run_frame();

    let after = kids(&doc, el.root());
    assert_eq!(after.len(), 3);
    assert_ne!(after[1], before[1]);
    assert_eq!(doc.borrow().tag_name(after[1]), Some("span"));
    assert_eq!(doc.borrow().text_content(after[1]), "x");
    assert!(!doc.borrow().contains(before[1]));
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_eq!(el.binding_of(after[0]), Some(first_binding));
}

#[test]
fn literal_children_enter_and_exit_cleanly() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("ul")]);
    frames.run_frame();
    let ul = kids(&doc, el.root())[0];
    let list = el.data().at(0).unwrap().children();

    list.assign(literals(&["a", "b", "c", "d"])).unwrap();
    frames.run_frame();
    assert_eq!(kids(&doc, ul).len(), 4);
    assert_eq!(doc.borrow().text_content(ul), "abcd");
    assert_eq!(el.bound_nodes(), 5);

    let created = kids(&doc, ul);
    list.truncate(0).unwrap();
    frames.run_frame();
    assert!(kids(&doc, ul).is_empty());
    assert!(created.iter().all(|n| !doc.borrow().contains(*n)));
    assert_eq!(el.bound_nodes(), 1);
    assert_eq!(el.last_stats().unwrap().exited, 4);

    list.touch().unwrap();
    frames.run_frame();
    let stats = el.last_stats().unwrap();
    assert_eq!((stats.entered, stats.exited, stats.stale), (0, 0, 0));
}

#[test]
fn keyed_literals_keep_identity_across_reassignments() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_scope(Scope::default().with_key(|item, _| match item {
        Item::Literal(value) => value.render(),
        Item::Record(_) => String::new(),
    }));
    el.set_data(literals(&["a", "b", "c"]));
    frames.run_frame();
    let first = kids(&doc, el.root());

    el.data().assign(literals(&["c", "a", "b"])).unwrap();
    frames.run_frame();
    let second = kids(&doc, el.root());
    assert_eq!(second, vec![first[2], first[0], first[1]]);

    el.data().assign(literals(&["b", "d", "c"])).unwrap();
    frames.run_frame();
    let third = kids(&doc, el.root());
    assert_eq!(third[0], first[1]);
    assert_eq!(third[2], first[2]);
    assert!(!first.contains(&third[1]));
    assert!(!doc.borrow().contains(first[0]));
    assert_eq!(doc.borrow().text_content(el.root()), "bdc");
}

#[test]
fn keyed_records_keep_identity_across_reassignments() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_scope(Scope::default().with_key(|item, _| match item {
        Item::Record(record) => record.props.attr("id").map(Value::render).unwrap_or_default(),
        Item::Literal(value) => value.render(),
    }));
    let row = |id: &str, text: &str| Record::new("li").attr("id", id).text(text);
    el.set_data(vec![row("a", "1"), row("b", "2")]);
    frames.run_frame();
    let first = kids(&doc, el.root());

    el.data().assign(vec![row("b", "20"), row("a", "10")]).unwrap();
    frames.run_frame();
    let second = kids(&doc, el.root());
    assert_eq!(second, vec![first[1], first[0]]);
    assert_eq!(doc.borrow().text_content(el.root()), "2010");

    el.data().assign(vec![row("a", "100"), row("b", "200")]).unwrap();
    frames.run_frame();
    assert_eq!(kids(&doc, el.root()), first);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

fn counting(count: &Rc<Cell<u32>>) -> impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static {
    let count = Rc::clone(count);
    move |_: &mut NodeCx<'_>| {
        count.set(count.get() + 1);
        Ok(())
    }
}

#[test]
fn on_update_fires_only_for_kept_nodes() {
    let (_, frames, el) = mount(ElementConfig::default());
    let updates = Rc::new(Cell::new(0));
    el.set_data(vec![Record::new("p").on_update(counting(&updates))]);
    frames.run_frame();
    assert_eq!(updates.get(), 0);

    el.data().at(0).unwrap().set_text("changed").unwrap();
    frames.run_frame();
    assert_eq!(updates.get(), 1);

    el.data().set(0, Record::new("p").on_update(counting(&updates))).unwrap();
    frames.run_frame();
    assert_eq!(updates.get(), 1);
}

#[test]
fn post_hooks_run_in_order() {
    let (_, frames, el) = mount(ElementConfig::default());
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let (each_log, call_log) = (Rc::clone(&log), Rc::clone(&log));
    el.set_scope(
        Scope::default()
            .with_each(move |cx| {
                each_log.borrow_mut().push(format!("each{}", cx.index));
                Ok(())
            })
            .with_call(move |cx| {
                call_log.borrow_mut().push(format!("call{}", cx.nodes.len()));
                Ok(())
            }),
    );
    let (own_each, update, own_call) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
    el.set_data(vec![
        Record::new("p")
            .own_each(move |_| {
                own_each.borrow_mut().push("own_each".into());
                Ok(())
            })
            .on_update(move |_| {
                update.borrow_mut().push("update".into());
                Ok(())
            })
            .own_call(move |cx| {
                own_call.borrow_mut().push(format!("own_call{}", cx.nodes.len()));
                Ok(())
            }),
        Record::new("p"),
    ]);
    frames.run_frame();
    log.borrow_mut().clear();

    el.data().at(0).unwrap().set_text("x").unwrap();
    frames.run_frame();
    assert_eq!(
        *log.borrow(),
        vec!["own_each", "update", "own_call1", "each0", "each1", "call2"]
    );
}

#[test]
fn hook_writes_land_in_a_follow_on_pass() {
    let (doc, frames, el) = mount(ElementConfig::default());
    let writer = el.clone();
    let written = Rc::new(Cell::new(false));
    let flag = Rc::clone(&written);
    el.set_data(vec![Record::new("p").text("first").own_each(move |_| {
        if !flag.replace(true)
            && let Some(p) = writer.data().at(0)
        {
            p.set_text("from hook").unwrap();
        }
        Ok(())
    })]);

    let report = frames.run_frame();
    assert!(written.get());
    assert_eq!(report.ran, 2);
    assert_eq!(el.passes(), 2);
    assert_eq!(doc.borrow().text_content(el.root()), "from hook");
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[test]
fn transition_ends_on_target_style() {
    let (doc, frames, el) = mount(ElementConfig::default());
    let ended = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ended);
    el.set_data(vec![Record::new("div").transition(
        TransitionConfig::new()
            .duration(100.0)
            .style("width", "10px")
            .on("end", move |_: &mut EventCx<'_>| {
                counter.set(counter.get() + 1);
                Ok(())
            }),
    )]);
    frames.run_frame();
    let node = kids(&doc, el.root())[0];

    doc.borrow_mut().advance(50.0);
    assert_eq!(ended.get(), 0);
    doc.borrow_mut().advance(60.0);
    assert_eq!(ended.get(), 1);
    assert_eq!(doc.borrow().style(node, "width"), Some("10px"));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
#[traced_test]
fn callback_error_is_logged_and_siblings_render() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![
        Record::new("p").own_each(|_| Err("boom".into())),
        Record::new("p").text("fine"),
    ]);
    frames.run_frame();
    assert_eq!(doc.borrow().text_content(el.root()), "fine");
    assert_eq!(el.last_stats().unwrap().callback_errors, 1);
    assert!(logs_contain("callback failed"));
    assert!(logs_contain("boom"));
}

#[test]
fn deletion_is_unsupported() {
    let (_, _, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("p")]);
    assert!(matches!(el.data().remove(0), Err(WeaveError::Unsupported(_))));
    assert!(matches!(el.data().pop(), Err(WeaveError::Unsupported(_))));
    let p = el.data().at(0).unwrap();
    assert!(matches!(p.delete_field("text"), Err(WeaveError::Unsupported(_))));
}

#[test]
fn json_data_must_be_an_array() {
    let (doc, frames, el) = mount(ElementConfig::default());
    let err = el.set_data_json(&json!({"tag": "p"})).unwrap_err();
    assert!(matches!(err, WeaveError::InvalidShape { .. }));
    assert!(!el.has_data());

    el.set_data_json(&json!([{"tag": "p", "text": "hi", "attrs": {"class": "x"}}]))
        .unwrap();
    frames.run_frame();
    let doc = doc.borrow();
    let p = doc.children(el.root())[0];
    assert_eq!(doc.text_content(p), "hi");
    assert_eq!(doc.attr(p, "class"), Some("x"));
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[test]
#[traced_test]
fn sync_reruns_are_capped() {
    let (_, frames, el) = mount(ElementConfig::default().with_sync(true).with_max_drain_rounds(3));
    let writer = el.clone();
    let count = Rc::new(Cell::new(0));
    let seen = Rc::clone(&count);
    let _sub = el.on_update(move |_| {
        seen.set(seen.get() + 1);
        if let Some(p) = writer.data().at(0) {
            p.set_text(format!("{}", seen.get())).unwrap();
        }
    });
    el.set_data(vec![Record::new("p")]);
    assert_eq!(el.passes(), 3);
    assert_eq!(frames.pending(), 1);
    assert!(logs_contain("pass drain limit reached"));
}

#[test]
fn follow_on_pass_runs_in_the_same_frame() {
    let (doc, frames, el) = mount(ElementConfig::default());
    let writer = el.clone();
    let once = Rc::new(Cell::new(false));
    let flag = Rc::clone(&once);
    let _sub = el.on_update(move |_| {
        if !flag.replace(true)
            && let Some(p) = writer.data().at(0)
        {
            p.set_text("second").unwrap();
        }
    });
    el.set_data(vec![Record::new("p").text("first")]);
    let done = el.complete();
    assert!(!done.is_done());

    let report = frames.run_frame();
    assert_eq!(report.ran, 2);
    assert_eq!(el.passes(), 2);
    assert!(done.is_done());
    assert!(el.complete().is_done());
    assert_eq!(doc.borrow().text_content(el.root()), "second");
}

#[test]
fn disconnected_element_ignores_writes() {
    let (doc, frames, el) = mount(ElementConfig::default());
    el.set_data(vec![Record::new("p").text("a")]);
    frames.run_frame();
    el.disconnect();
    el.data().at(0).unwrap().set_text("b").unwrap();
    assert_eq!(frames.run_frame().ran, 0);
    assert_eq!(doc.borrow().text_content(el.root()), "a");

    el.reconnect();
    frames.run_frame();
    assert_eq!(doc.borrow().text_content(el.root()), "b");
}

#[test]
fn update_listeners_see_every_pass() {
    let (_, frames, el) = mount(ElementConfig::default());
    let passes = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&passes);
    let _sub = el.on_update(move |report| log.borrow_mut().push((report.pass, report.stats.entered)));
    el.set_data(vec![Record::new("p"), Record::new("p")]);
    frames.run_frame();
    el.data().push(Record::new("p")).unwrap();
    frames.run_frame();
    assert_eq!(*passes.borrow(), vec![(1, 2), (2, 1)]);
}

#[test]
fn sync_insert_runs_one_pass() {
    let (doc, _, el) = mount(ElementConfig::default().with_sync(true));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (log, reader, root) = (Rc::clone(&seen), Rc::clone(&doc), el.root());
    let _sub = el.on_update(move |_| log.borrow_mut().push(reader.borrow().text_content(root)));
    el.set_data(vec![
        Record::new("p").text("a"),
        Record::new("p").text("b"),
        Record::new("p").text("c"),
    ]);
    assert_eq!(el.passes(), 1);

    el.data().insert(0, Record::new("p").text("n")).unwrap();
    assert_eq!(el.passes(), 2);
    assert_eq!(*seen.borrow(), vec!["abc", "nabc"]);
    assert_eq!(kids(&doc, el.root()).len(), 4);
}
