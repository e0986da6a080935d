use crate::error::Result;
use crate::offset::Offset;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A parsed VAST response: either a playable ad or a redirect to another document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum Document {
    Inline(Inline),
    Wrapper(Wrapper),
}

/// A directly playable ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Inline {
    /// The `id` attribute of the Ad element
    pub id: Option<String>,

    /// Recognized media files, in document order
    pub media_files: Vec<MediaFile>,

    /// The video click-through URL
    pub clickthrough: Option<Url>,

    /// Raw AdParameters content, handed to VPAID creatives
    pub ad_parameters: Option<String>,

    /// Tracking pixels by event
    pub pixels: PixelSet,

    /// Verification scripts, top-level entries first
    pub ad_verifications: Vec<AdVerification>,

    /// When the skip control becomes available
    pub skip_offset: Option<Offset>,

    /// Progress pixels with their firing offsets
    pub progress: Vec<ProgressMarker>,
}

impl Inline {
    pub fn mp4_media_files(&self) -> impl Iterator<Item = &MediaFile> {
        self.media_files.iter().filter(|m| m.format == MediaFormat::Mp4)
    }

    pub fn vpaid_media_files(&self) -> impl Iterator<Item = &MediaFile> {
        self.media_files.iter().filter(|m| m.format == MediaFormat::Vpaid)
    }
}

/// A redirect to another VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wrapper {
    /// The VASTAdTagURI text as it appeared in the document
    pub tag_uri: String,

    /// The URL of the next VAST document
    pub tag_url: Url,

    /// Verification scripts, top-level entries first
    pub ad_verifications: Vec<AdVerification>,

    /// Tracking pixels by event
    pub pixels: PixelSet,
}

impl Wrapper {
    /// A wrapper pointing at `tag_uri`, with no tracking yet.
    ///
    /// The URI is used as-is when it parses; a fully percent-encoded URI is
    /// decoded first.
    pub fn new(tag_uri: impl Into<String>) -> Result<Self> {
        let tag_uri = tag_uri.into();
        let tag_url = match Url::parse(&tag_uri) {
            Ok(url) => url,
            Err(e) => {
                let decoded = percent_decode_str(&tag_uri).decode_utf8_lossy();
                if decoded == tag_uri.as_str() {
                    return Err(e.into());
                }
                Url::parse(&decoded)?
            }
        };

        Ok(Self {
            tag_uri,
            tag_url,
            ad_verifications: Vec::new(),
            pixels: PixelSet::new(),
        })
    }

    /// The tag URI with percent-encoding removed once, for display and comparison
    pub fn decoded_tag_url(&self) -> String {
        percent_decode_str(&self.tag_uri).decode_utf8_lossy().into_owned()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MediaFormat {
    Mp4,
    Vpaid,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct MediaFile {
    pub url: Url,
    pub format: MediaFormat,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ProgressMarker {
    pub url: Url,
    pub offset: Offset,
}

/// A third-party verification script attached to an ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct AdVerification {
    /// The `vendor` attribute of the Verification element
    pub vendor_key: Option<String>,

    /// The verification script
    pub javascript_resource: Url,

    pub verification_parameters: Option<Url>,

    /// Pixel fired when the script could not be executed
    pub verification_not_executed: Option<Url>,
}

/// Events a tracking pixel can be attached to
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum TrackingEvent {
    Impression,
    Error,
    ClickTracking,
    CreativeView,
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Pause,
    Resume,
    Skip,
    Mute,
    Unmute,
    AcceptInvitation,
    AcceptInvitationLinear,
    Close,
    CloseLinear,
    Collapse,
}

impl TrackingEvent {
    pub const ALL: [TrackingEvent; 19] = [
        TrackingEvent::Impression,
        TrackingEvent::Error,
        TrackingEvent::ClickTracking,
        TrackingEvent::CreativeView,
        TrackingEvent::Start,
        TrackingEvent::FirstQuartile,
        TrackingEvent::Midpoint,
        TrackingEvent::ThirdQuartile,
        TrackingEvent::Complete,
        TrackingEvent::Pause,
        TrackingEvent::Resume,
        TrackingEvent::Skip,
        TrackingEvent::Mute,
        TrackingEvent::Unmute,
        TrackingEvent::AcceptInvitation,
        TrackingEvent::AcceptInvitationLinear,
        TrackingEvent::Close,
        TrackingEvent::CloseLinear,
        TrackingEvent::Collapse,
    ];

    /// The event name as written in VAST documents
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingEvent::Impression => "impression",
            TrackingEvent::Error => "error",
            TrackingEvent::ClickTracking => "clickTracking",
            TrackingEvent::CreativeView => "creativeView",
            TrackingEvent::Start => "start",
            TrackingEvent::FirstQuartile => "firstQuartile",
            TrackingEvent::Midpoint => "midpoint",
            TrackingEvent::ThirdQuartile => "thirdQuartile",
            TrackingEvent::Complete => "complete",
            TrackingEvent::Pause => "pause",
            TrackingEvent::Resume => "resume",
            TrackingEvent::Skip => "skip",
            TrackingEvent::Mute => "mute",
            TrackingEvent::Unmute => "unmute",
            TrackingEvent::AcceptInvitation => "acceptInvitation",
            TrackingEvent::AcceptInvitationLinear => "acceptInvitationLinear",
            TrackingEvent::Close => "close",
            TrackingEvent::CloseLinear => "closeLinear",
            TrackingEvent::Collapse => "collapse",
        }
    }

    pub fn from_name(name: &str) -> Option<TrackingEvent> {
        TrackingEvent::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

/// Tracking pixel URLs grouped by event, each list in document order
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct PixelSet {
    pixels: BTreeMap<TrackingEvent, Vec<Url>>,
}

impl PixelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs registered for `event`; empty when the document had none
    pub fn get(&self, event: TrackingEvent) -> &[Url] {
        self.pixels.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push(&mut self, event: TrackingEvent, url: Url) {
        self.pixels.entry(event).or_default().push(url);
    }

    /// Append every pixel of `other` after the ones already present
    pub fn extend(&mut self, other: &PixelSet) {
        for (event, urls) in &other.pixels {
            self.pixels.entry(*event).or_default().extend(urls.iter().cloned());
        }
    }

    /// Total number of pixel URLs across all events
    pub fn len(&self) -> usize {
        self.pixels.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VastError;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn pixel_set_keeps_order_and_duplicates() {
        let mut pixels = PixelSet::new();
        pixels.push(TrackingEvent::Start, url("http://a.com/1"));
        pixels.push(TrackingEvent::Start, url("http://a.com/2"));
        pixels.push(TrackingEvent::Start, url("http://a.com/1"));

        assert_eq!(
            pixels.get(TrackingEvent::Start),
            &[url("http://a.com/1"), url("http://a.com/2"), url("http://a.com/1")]
        );
        assert!(pixels.get(TrackingEvent::Complete).is_empty());
        assert_eq!(pixels.len(), 3);
    }

    #[test]
    fn event_names_round_trip() {
        for event in TrackingEvent::ALL {
            assert_eq!(TrackingEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(TrackingEvent::from_name("progress"), None);
    }

    #[test]
    fn decodes_tag_url_once() {
        let wrapper = Wrapper::new("http://myTrackingURL/ad%2520TagURL").unwrap();
        assert_eq!(wrapper.decoded_tag_url(), "http://myTrackingURL/ad%20TagURL");
        assert_eq!(wrapper.tag_url.as_str(), "http://mytrackingurl/ad%2520TagURL");
    }

    #[test]
    fn fully_encoded_tag_uri_is_decoded_before_fetching() {
        let wrapper = Wrapper::new("http%3A%2F%2FmyTrackingURL%2FadTagURL").unwrap();
        assert_eq!(wrapper.decoded_tag_url(), "http://myTrackingURL/adTagURL");
        assert_eq!(wrapper.tag_url.as_str(), "http://mytrackingurl/adTagURL");
    }

    #[test]
    fn unparseable_tag_uri_is_an_error() {
        assert!(matches!(Wrapper::new("not a url"), Err(VastError::UrlError(_))));
    }
}
