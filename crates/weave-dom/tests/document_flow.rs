use std::cell::Cell;
use std::rc::Rc;

use tracing_test::traced_test;
use weave_dom::{
    CallbackResult, Document, EventCx, JoinSlot, Selector, Value, join_by_key,
};

#[test]
fn keyed_join_then_order_matches_data() {
    let mut doc = Document::new();
    let list = doc.create_element("ul");
    let mut keyed = Vec::new();
    for key in ["a", "b", "c"] {
        let li = doc.create_element("li");
        doc.set_attr(li, "data-key", &Value::from(key)).unwrap();
        doc.append_child(list, li).unwrap();
        keyed.push((li, Some(key.to_owned())));
    }

    let data: Vec<String> = ["c", "a", "d"].iter().map(|s| (*s).to_owned()).collect();
    let plan = join_by_key(&keyed, &data);

    let mut ordered = Vec::new();
    for (i, slot) in plan.slots.iter().enumerate() {
        let node = match slot {
            JoinSlot::Update(node) => *node,
            JoinSlot::Enter => {
                let li = doc.create_element("li");
                doc.set_attr(li, "data-key", &Value::from(data[i].as_str()))
                    .unwrap();
                doc.insert_before(list, li, plan.next_update_after(i)).unwrap();
                li
            }
        };
        ordered.push(node);
    }
    for node in &plan.exit {
        doc.discard(*node).unwrap();
    }
    doc.order(&ordered).unwrap();

    let keys: Vec<&str> = doc
        .select_all(list, &Selector::ChildElements)
        .into_iter()
        .filter_map(|n| doc.attr(n, "data-key"))
        .collect();
    assert_eq!(keys, ["c", "a", "d"]);
    assert_eq!(ordered[0], keyed[2].0);
    assert_eq!(ordered[1], keyed[0].0);
}

#[test]
#[traced_test]
fn failing_handler_is_logged_and_others_run() {
    let mut doc = Document::new();
    let button = doc.create_element("button");
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    doc.on(
        button,
        "click.broken",
        Some(Rc::new(|_: &mut EventCx<'_>| -> CallbackResult {
            Err("handler exploded".into())
        })),
    )
    .unwrap();
    doc.on(
        button,
        "click.ok",
        Some(Rc::new(move |_: &mut EventCx<'_>| -> CallbackResult {
            counter.set(counter.get() + 1);
            Ok(())
        })),
    )
    .unwrap();

    doc.invoke(button, "click", &[]).unwrap();
    assert_eq!(hits.get(), 1);
    assert!(logs_contain("event handler failed"));
    assert!(logs_contain("handler exploded"));
}

#[test]
fn transition_runs_to_completion_on_the_clock() {
    let mut doc = Document::new();
    let bar = doc.create_element("svg:rect");
    doc.set_attr(bar, "width", &Value::from(0)).unwrap();

    let grow = doc.transition(bar, Some("grow")).unwrap();
    doc.call_transition_method(grow, "duration", &[Value::from(200)])
        .unwrap();
    doc.call_transition_method(grow, "attr", &[Value::from("width"), Value::from(100)])
        .unwrap();
    let fade = doc.chain(grow).unwrap();
    doc.transition_style(fade, "opacity", Value::from("0"), false)
        .unwrap();

    let mut frames = 0;
    while doc.active_transitions() > 0 && frames < 100 {
        doc.advance(16.0);
        frames += 1;
    }
    assert_eq!(doc.attr(bar, "width"), Some("100"));
    assert_eq!(doc.style(bar, "opacity"), Some("0"));
    assert!(doc.now() >= 400.0);
}
