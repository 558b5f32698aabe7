use serde_json::json;
use weave::prelude::*;

#[test]
fn clock_of_keyed_literals_ticks() {
    let doc = Rc::new(RefCell::new(Document::new()));
    let root = doc.borrow_mut().create_element("svg:svg");
    let frames = FrameLoop::new();
    let el = Element::new(Rc::clone(&doc), root, Rc::new(frames.clone()));
    el.set_scope(
        Scope::default()
            .with_ns("svg")
            .with_key(|item, _| match item {
                Item::Literal(value) => value.render(),
                Item::Record(_) => String::new(),
            }),
    );

    el.set_data(Children::Literals(vec![Value::from("12"), Value::from("00")]));
    frames.run_frame();
    let hours = doc.borrow().children(root)[0];
    assert_eq!(doc.borrow().tag_name(hours), Some("text"));

    el.data()
        .assign(Children::Literals(vec![Value::from("12"), Value::from("01")]))
        .unwrap();
    frames.run_frame();
    let doc = doc.borrow();
    assert_eq!(doc.children(root)[0], hours);
    assert_eq!(doc.text_content(root), "1201");
}

#[test]
fn json_authored_tree_renders() {
    let doc = Rc::new(RefCell::new(Document::new()));
    let root = doc.borrow_mut().create_element("div");
    let frames = FrameLoop::new();
    let el = Element::new(Rc::clone(&doc), root, Rc::new(frames.clone()));
    el.set_data_json(&json!([
        {"tag": "ul", "children": [
            {"tag": "li", "text": "1", "styles": {"color": "red"}},
            {"tag": "li", "text": "2"}
        ]}
    ]))
    .unwrap();
    frames.run_frame();

    let doc = doc.borrow();
    let ul = doc.children(root)[0];
    let first = doc.children(ul)[0];
    assert_eq!(doc.text_content(ul), "12");
    assert_eq!(doc.style(first, "color"), Some("red"));
}
