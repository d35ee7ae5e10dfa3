mod common;

use std::sync::{Arc, Mutex};

use common::fixtures::{chapter_xhtml, laid_out, navigator_at, ShimNavigator};
use epub_viewport::{
    Blacklist, ContentTree, NavigationErrorKind, NavigatorDiagnostic, NodeRange, Picker,
};

fn recording(nav: &mut ShimNavigator) -> Arc<Mutex<Vec<NavigatorDiagnostic>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    nav.set_diagnostic_sink(move |d| sink.lock().expect("sink").push(d));
    seen
}

fn text_of(nav: &ShimNavigator, id: &str) -> epub_viewport::NodeId {
    let element = nav.element_by_id(id).expect("element");
    nav.surface().first_text(element).expect("text")
}

#[test]
fn first_and_last_visible_on_the_opening_page() {
    let mut nav = navigator_at(&chapter_xhtml(6), 0, false);
    assert_eq!(
        nav.first_visible_cfi().map(|c| c.into_string()),
        Some("/4/2[p0],/1:0,/1:1".to_string())
    );
    assert_eq!(
        nav.last_visible_cfi().map(|c| c.into_string()),
        Some("/4/2[p0],/1:79,/1:80".to_string())
    );
}

#[test]
fn paging_moves_the_visible_window() {
    let mut nav = navigator_at(&chapter_xhtml(6), 2, false);
    assert_eq!(
        nav.first_visible_cfi().map(|c| c.into_string()),
        Some("/4/6[p2],/1:0,/1:1".to_string())
    );
    assert_eq!(nav.page_for_element_id("p0"), Some(0));
    assert_eq!(nav.page_for_element_id("p2"), Some(2));
    assert_eq!(nav.page_for_element_id("p4"), Some(4));
    assert_eq!(nav.page_for_element_id("missing"), None);

    let p2 = nav.element_by_id("p2").expect("p2");
    let p3 = nav.element_by_id("p3").expect("p3");
    assert_eq!(nav.element_visibility(p2), Some(100));
    assert_eq!(nav.element_visibility(p3), Some(0));
}

#[test]
fn visible_leaves_follow_picker_order() {
    let xhtml = "<html><head/><body><p id=\"a\">first</p><p id=\"b\">second</p></body></html>";
    let mut nav = navigator_at(xhtml, 0, false);
    let first = nav
        .visible_leaf_nodes(None, None, Some(Picker::First))
        .expect("leaves");
    let last = nav
        .visible_leaf_nodes(None, None, Some(Picker::Last))
        .expect("leaves");
    let a = nav.element_by_id("a").expect("a");
    let b = nav.element_by_id("b").expect("b");
    assert_eq!(
        first.iter().map(|l| l.element).collect::<Vec<_>>(),
        vec![a, b]
    );
    assert_eq!(
        last.iter().map(|l| l.element).collect::<Vec<_>>(),
        vec![b, a]
    );
    assert!(first.iter().all(|l| l.is_fully_visible()));
}

#[test]
fn right_to_left_pages_count_from_the_right() {
    let mut nav = navigator_at(&chapter_xhtml(4), 1, true);
    assert_eq!(
        nav.first_visible_cfi().map(|c| c.into_string()),
        Some("/4/4[p1],/1:0,/1:1".to_string())
    );
    assert_eq!(nav.page_for_element_id("p0"), Some(0));
    assert_eq!(nav.page_for_element_id("p1"), Some(1));
    assert_eq!(nav.page_for_element_id("p3"), Some(3));
}

#[test]
fn point_queries_resolve_back_to_visible_content() {
    let nav = navigator_at(&chapter_xhtml(3), 0, false);
    let cfi = nav
        .visible_cfi_from_point(25.0, 5.0, true)
        .expect("point cfi");
    assert!(cfi.as_str().starts_with("/4/2[p0],/1:"), "{}", cfi);
    assert_eq!(nav.is_node_from_range_cfi_visible(cfi.as_str()), Some(true));

    // A point in the right half of a glyph addresses that glyph.
    assert_eq!(
        nav.visible_cfi_from_point(28.0, 5.0, true)
            .map(|c| c.into_string()),
        Some("/4/2[p0],/1:2,/1:3".to_string())
    );

    // Outside every text line.
    assert_eq!(nav.visible_cfi_from_point(395.0, 500.0, true), None);

    let range = nav
        .range_cfi_from_points(1.0, 5.0, 95.0, 5.0)
        .expect("range cfi");
    let resolved = nav
        .dom_range_from_range_cfi(range.as_str(), None, false)
        .expect("dom range");
    let text = text_of(&nav, "p0");
    assert_eq!(resolved.start.node, text);
    assert_eq!(resolved.start.offset, 0);
    assert!(resolved.end.offset > resolved.start.offset);
}

#[test]
fn element_cfis_round_trip_through_nested_levels() {
    let xhtml = "<html><head/><body><section id=\"s\"><div><blockquote>\
        <em>deep text</em></blockquote></div></section></body></html>";
    let mut nav = navigator_at(xhtml, 0, false);
    let em = nav.surface().elements_named("em")[0];
    let cfi = nav.cfi_for_element(em).expect("element cfi");
    assert_eq!(cfi.as_str(), "/4/2[s]/2/2/2");
    assert_eq!(nav.element_by_cfi(cfi.as_str()), Some(em));
    assert_eq!(nav.element_by_cfi("epubcfi(/6/2!/4/2[s]/2/2/2)"), Some(em));
    assert_eq!(nav.page_for_element_cfi(cfi.as_str()), Some(0));
}

#[test]
fn empty_elements_round_trip() {
    let xhtml = "<html><head/><body><section id=\"s\"><div><figure><img/></figure></div>\
        <hr/></section></body></html>";
    let mut nav = navigator_at(xhtml, 0, false);
    let doc = nav.surface();
    let targets = [
        doc.elements_named("div")[0],
        doc.elements_named("figure")[0],
        doc.elements_named("img")[0],
        doc.elements_named("hr")[0],
    ];
    for element in targets {
        let cfi = nav.cfi_for_element(element).expect("element cfi");
        assert_eq!(nav.element_by_cfi(cfi.as_str()), Some(element), "{cfi}");
    }
    let img = targets[2];
    assert_eq!(
        nav.cfi_for_element(img).map(|c| c.into_string()),
        Some("/4/2[s]/2/2/2".to_string())
    );
}

#[test]
fn one_character_ranges_round_trip() {
    let nav = navigator_at(&chapter_xhtml(2), 0, false);
    let text = text_of(&nav, "p1");
    let len = nav.surface().text_len(text);
    for i in 0..len {
        let range = NodeRange::in_text(text, i, i + 1);
        let cfi = nav.range_cfi_from_node_range(&range).expect("range cfi");
        assert_eq!(
            nav.dom_range_from_range_cfi(cfi.as_str(), None, false),
            Some(range),
            "offset {i}"
        );
    }
}

#[test]
fn collapsed_ranges_are_widened() {
    let nav = navigator_at(&chapter_xhtml(1), 0, false);
    let text = text_of(&nav, "p0");
    let at_end = NodeRange::in_text(text, 80, 80);
    assert_eq!(
        nav.range_cfi_from_node_range(&at_end).map(|c| c.into_string()),
        Some("/4/2[p0],/1:79,/1:80".to_string())
    );
}

#[test]
fn start_and_end_ignore_visibility() {
    let mut nav = navigator_at(&chapter_xhtml(6), 3, false);
    assert_eq!(
        nav.start_cfi().map(|c| c.into_string()),
        Some("/4/2[p0],/1:0,/1:1".to_string())
    );
    assert_eq!(
        nav.end_cfi().map(|c| c.into_string()),
        Some("/4/12[p5],/1:79,/1:80".to_string())
    );
}

#[test]
fn dom_range_spans_two_cfis() {
    let mut nav = navigator_at(&chapter_xhtml(3), 0, false);
    let p0 = nav.element_by_id("p0").expect("p0");
    let p2 = nav.element_by_id("p2").expect("p2");
    let start = nav.cfi_for_element(p0).expect("p0 cfi");
    let end = nav.cfi_for_element(p2).expect("p2 cfi");
    let body = nav.surface().body().expect("body");

    let inclusive = nav
        .dom_range_from_range_cfi(start.as_str(), Some(end.as_str()), true)
        .expect("inclusive");
    assert_eq!((inclusive.start.node, inclusive.start.offset), (body, 0));
    assert_eq!((inclusive.end.node, inclusive.end.offset), (body, 3));

    let exclusive = nav
        .dom_range_from_range_cfi(start.as_str(), Some(end.as_str()), false)
        .expect("exclusive");
    assert_eq!(exclusive.end.offset, 2);
}

#[test]
fn blacklisted_markers_are_transparent() {
    let xhtml = "<html><head/><body><p id=\"p0\"><span class=\"cfi-marker\">MARK</span>\
        abcdefghij</p></body></html>";
    let mut nav = navigator_at(xhtml, 0, false);
    assert_eq!(
        nav.first_visible_cfi().map(|c| c.into_string()),
        Some("/4/2[p0]/2,/1:0,/1:1".to_string())
    );
    nav.set_blacklist(Blacklist::default().with_class("cfi-marker"));
    assert_eq!(
        nav.first_visible_cfi().map(|c| c.into_string()),
        Some("/4/2[p0],/1:4,/1:5".to_string())
    );
}

#[test]
fn repeated_queries_hit_the_cache_with_identical_results() {
    let mut nav = navigator_at(&chapter_xhtml(4), 1, false);
    let seen = recording(&mut nav);
    let miss = nav.first_visible_cfi();
    let hit = nav.first_visible_cfi();
    assert!(miss.is_some());
    assert_eq!(miss, hit);
    let log = seen.lock().expect("log");
    assert!(log.contains(&NavigatorDiagnostic::CacheMiss {
        table: "visible_cfi"
    }));
    assert!(log.contains(&NavigatorDiagnostic::CacheHit {
        table: "visible_cfi"
    }));
}

#[test]
fn visible_leaves_are_stable_across_cache_hits() {
    let mut nav = navigator_at(&chapter_xhtml(4), 2, false);
    let seen = recording(&mut nav);
    let miss = nav.visible_leaf_nodes(None, None, None).expect("leaves");
    let hit = nav.visible_leaf_nodes(None, None, None).expect("leaves");
    assert!(!miss.is_empty());
    assert_eq!(miss, hit);
    assert_eq!(
        seen.lock().expect("log").as_slice(),
        &[
            NavigatorDiagnostic::CacheMiss {
                table: "visible_leaves"
            },
            NavigatorDiagnostic::CacheHit {
                table: "visible_leaves"
            },
        ]
    );
}

#[test]
fn spine_change_drops_cached_leaves() {
    let mut nav = navigator_at(&chapter_xhtml(4), 0, false);
    let before = nav.visible_leaf_nodes(None, None, None).expect("before");
    let next = "<html><head/><body><div><h1>Two</h1><p>text</p></div></body></html>";
    let (doc, _) = laid_out(next, 0, false);
    nav.load_spine_item("chapter-2", doc);
    let after = nav.visible_leaf_nodes(None, None, None).expect("after");
    assert_ne!(before, after);
    assert_eq!(after.len(), 2);
}

#[test]
fn spine_change_rebuilds_the_cache() {
    let mut nav = navigator_at(&chapter_xhtml(4), 0, false);
    let before = nav.first_visible_cfi().expect("before");
    assert!(nav.cache_len() > 0);
    let seen = recording(&mut nav);

    let next = "<html><head/><body><h1 id=\"title\">Chapter Two</h1></body></html>";
    let (doc, _) = laid_out(next, 0, false);
    nav.load_spine_item("chapter-2", doc);
    assert_eq!(nav.cache_len(), 0);
    assert_eq!(nav.spine_item(), Some("chapter-2"));

    let after = nav.first_visible_cfi().expect("after");
    assert_ne!(before, after);
    assert_eq!(after.as_str(), "/4/2[title],/1:0,/1:1");

    let log = seen.lock().expect("log");
    let invalidated = log.iter().position(|d| {
        matches!(
            d,
            NavigatorDiagnostic::CacheInvalidated { reason: "spine_item", dropped } if *dropped > 0
        )
    });
    let refilled = log.iter().position(|d| {
        *d == NavigatorDiagnostic::CacheMiss {
            table: "visible_cfi",
        }
    });
    assert!(invalidated.is_some());
    assert!(refilled > invalidated);
}

#[test]
fn unchanged_pagination_keeps_the_cache() {
    let mut nav = navigator_at(&chapter_xhtml(2), 0, false);
    nav.first_visible_cfi();
    let len = nav.cache_len();
    let pagination = *nav.pagination();
    let frame = nav.frame();
    nav.set_pagination(pagination, frame);
    assert_eq!(nav.cache_len(), len);
    nav.set_pagination(pagination.with_page_offset(420.0), frame);
    assert_eq!(nav.cache_len(), 0);
}

#[test]
fn failures_surface_as_diagnostics() {
    let mut nav = navigator_at(&chapter_xhtml(2), 0, false);
    let seen = recording(&mut nav);

    assert_eq!(nav.element_by_cfi("/4/x"), None);
    assert_eq!(nav.element_by_cfi("/4/40"), None);
    nav.surface_mut().set_ready(false);
    assert_eq!(nav.first_visible_cfi(), None);

    let kinds: Vec<NavigationErrorKind> = seen
        .lock()
        .expect("log")
        .iter()
        .filter_map(|d| match d {
            NavigatorDiagnostic::QueryFailed { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            NavigationErrorKind::CodecSyntax,
            NavigationErrorKind::ResolutionMiss,
            NavigationErrorKind::GeometryUnavailable,
        ]
    );
}
