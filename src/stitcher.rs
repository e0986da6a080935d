use crate::models::{Inline, Wrapper};

/// Merge the tracking of a wrapper chain into the inline ad it resolved to.
///
/// The inline ad's own pixels and verifications stay first; each wrapper's
/// are appended after them, outermost wrapper first.
pub fn stitch_inline(mut inline: Inline, wrappers: &[Wrapper]) -> Inline {
    for wrapper in wrappers {
        inline.pixels.extend(&wrapper.pixels);
        inline
            .ad_verifications
            .extend(wrapper.ad_verifications.iter().cloned());
    }

    inline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdVerification, TrackingEvent};
    use url::Url;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn wrapper(impression: &str, script: &str) -> Wrapper {
        let mut wrapper = Wrapper::new("http://next.com/vast").unwrap();
        wrapper.pixels.push(TrackingEvent::Impression, url(impression));
        wrapper.ad_verifications.push(AdVerification {
            vendor_key: None,
            javascript_resource: url(script),
            verification_parameters: None,
            verification_not_executed: None,
        });
        wrapper
    }

    #[test]
    fn appends_wrapper_tracking_after_inline() {
        let mut inline = Inline::default();
        inline.pixels.push(TrackingEvent::Impression, url("http://inline.com/i"));

        let stitched = stitch_inline(
            inline,
            &[
                wrapper("http://outer.com/i", "http://outer.com/v.js"),
                wrapper("http://inner.com/i", "http://inner.com/v.js"),
            ],
        );

        assert_eq!(
            stitched.pixels.get(TrackingEvent::Impression),
            &[url("http://inline.com/i"), url("http://outer.com/i"), url("http://inner.com/i")]
        );
        let scripts: Vec<_> = stitched
            .ad_verifications
            .iter()
            .map(|v| v.javascript_resource.as_str())
            .collect();
        assert_eq!(scripts, ["http://outer.com/v.js", "http://inner.com/v.js"]);
    }

    #[test]
    fn no_wrappers_leaves_inline_untouched() {
        let mut inline = Inline::default();
        inline.pixels.push(TrackingEvent::Start, url("http://inline.com/s"));
        assert_eq!(stitch_inline(inline.clone(), &[]), inline);
    }
}
