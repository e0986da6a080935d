use crate::error::{Result, VastError};
use crate::models::*;
use crate::offset::{parse_offset, Offset};
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

type XmlReader<'a> = Reader<&'a [u8]>;

/// Parse a VAST XML string into a [`Document`].
///
/// Only the first Ad carrying an InLine or Wrapper element is considered.
/// Malformed optional fields are dropped; the parse only fails when the VAST
/// root is missing, no usable Ad exists, or a Wrapper has no tag URL.
pub fn parse_vast(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"VAST" => {
                return parse_ads(&mut reader);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"VAST" => {
                return Err(VastError::NoAd);
            }
            Event::Start(_) | Event::Empty(_) | Event::Eof => {
                return Err(VastError::MissingRoot);
            }
            _ => (),
        }
        buf.clear();
    }
}

/// Scan the children of the VAST element for the first usable Ad
fn parse_ads(reader: &mut XmlReader) -> Result<Document> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Ad" => {
                let id = attribute(e, b"id");
                if let Some(document) = parse_ad_element(reader, id)? {
                    return Ok(document);
                }
            }
            Event::Start(ref e) => skip_element(reader, e.name().as_ref())?,
            Event::End(ref e) if e.name().as_ref() == b"VAST" => break,
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    Err(VastError::NoAd)
}

/// Parse a single Ad element, returning `None` if it has neither InLine nor Wrapper
fn parse_ad_element(reader: &mut XmlReader, id: Option<String>) -> Result<Option<Document>> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"InLine" => return parse_inline_element(reader, id).map(|inline| Some(Document::Inline(inline))),
                b"Wrapper" => {
                    return parse_wrapper_element(reader).map(|wrapper| Some(Document::Wrapper(wrapper)));
                }
                name => skip_element(reader, name)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Ad" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    debug!("Skipping Ad {:?} without InLine or Wrapper", id);
    Ok(None)
}

/// Everything collected from the Creatives of an InLine or Wrapper
#[derive(Default)]
struct CreativeData {
    media_files: Vec<MediaFile>,
    clickthrough: Option<Url>,
    ad_parameters: Option<String>,
    pixels: PixelSet,
    skip_offset: Option<Offset>,
    progress: Vec<ProgressMarker>,
}

/// Parse an InLine element
fn parse_inline_element(reader: &mut XmlReader, id: Option<String>) -> Result<Inline> {
    let mut data = CreativeData::default();
    let mut verifications = Vec::new();
    let mut extension_verifications = Vec::new();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"Impression" => push_pixel(&mut data.pixels, TrackingEvent::Impression, &read_text_element(reader)?),
                b"Error" => push_pixel(&mut data.pixels, TrackingEvent::Error, &read_text_element(reader)?),
                b"AdVerifications" => verifications.extend(parse_ad_verifications(reader)?),
                b"Extensions" => extension_verifications.extend(parse_extensions(reader)?),
                b"Creatives" => parse_creatives(reader, &mut data)?,
                name => skip_element(reader, name)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"InLine" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    verifications.extend(extension_verifications);

    Ok(Inline {
        id,
        media_files: data.media_files,
        clickthrough: data.clickthrough,
        ad_parameters: data.ad_parameters,
        pixels: data.pixels,
        ad_verifications: verifications,
        skip_offset: data.skip_offset,
        progress: data.progress,
    })
}

/// Parse a Wrapper element
fn parse_wrapper_element(reader: &mut XmlReader) -> Result<Wrapper> {
    let mut tag_uri = None;
    let mut data = CreativeData::default();
    let mut verifications = Vec::new();
    let mut extension_verifications = Vec::new();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"VASTAdTagURI" => tag_uri = Some(read_text_element(reader)?),
                b"Impression" => push_pixel(&mut data.pixels, TrackingEvent::Impression, &read_text_element(reader)?),
                b"Error" => push_pixel(&mut data.pixels, TrackingEvent::Error, &read_text_element(reader)?),
                b"AdVerifications" => verifications.extend(parse_ad_verifications(reader)?),
                b"Extensions" => extension_verifications.extend(parse_extensions(reader)?),
                b"Creatives" => parse_creatives(reader, &mut data)?,
                name => skip_element(reader, name)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Wrapper" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    let tag_uri = tag_uri
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| VastError::MissingField("VASTAdTagURI".to_string()))?;

    verifications.extend(extension_verifications);

    let mut wrapper = Wrapper::new(tag_uri)?;
    wrapper.ad_verifications = verifications;
    wrapper.pixels = data.pixels;
    Ok(wrapper)
}

/// Read the text content of the current element, joining text and CDATA
/// sections and ignoring any nested markup
fn read_text_element(reader: &mut XmlReader) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) if depth == 0 => text.push_str(&e.unescape()?),
            Event::CData(e) if depth == 0 => text.push_str(&String::from_utf8_lossy(&e)),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}

/// Skip an XML element and all its children. The start tag must already be consumed.
fn skip_element(reader: &mut XmlReader, name: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(ref e) if depth == 0 => {
                debug_assert_eq!(e.name().as_ref(), name);
                break;
            }
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// The unescaped value of attribute `name`, if present and well-formed
fn attribute(start: &BytesStart, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

fn parse_url(text: &str, what: &str) -> Option<Url> {
    match Url::parse(text) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Dropping {} with invalid URL {:?}: {}", what, text, e);
            None
        }
    }
}

fn push_pixel(pixels: &mut PixelSet, event: TrackingEvent, text: &str) {
    if let Some(url) = parse_url(text, event.as_str()) {
        pixels.push(event, url);
    }
}

/// Parse Creatives element
fn parse_creatives(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Creative" => parse_creative(reader, data)?,
            Event::Start(ref e) => skip_element(reader, e.name().as_ref())?,
            Event::End(ref e) if e.name().as_ref() == b"Creatives" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse Creative element. Non-linear parts only contribute tracking pixels.
fn parse_creative(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Linear" => {
                if data.skip_offset.is_none() {
                    data.skip_offset = attribute(e, b"skipoffset").and_then(|value| parse_offset(&value));
                }
                parse_linear(reader, data)?;
            }
            Event::Start(_) => collect_tracking(reader, data)?,
            Event::End(ref e) if e.name().as_ref() == b"Creative" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse Linear element
fn parse_linear(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"MediaFiles" => parse_media_files(reader, data)?,
                b"VideoClicks" => parse_video_clicks(reader, data)?,
                b"AdParameters" => data.ad_parameters = Some(read_text_element(reader)?),
                b"Duration" => skip_element(reader, b"Duration")?,
                _ => collect_tracking(reader, data)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Linear" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Walk to the end of the current element, collecting every Tracking element
/// regardless of how deep it is nested
fn collect_tracking(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Tracking" => {
                let event = attribute(e, b"event");
                let offset = attribute(e, b"offset");
                let text = read_text_element(reader)?;
                push_tracking(data, event.as_deref(), offset.as_deref(), &text);
            }
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

fn push_tracking(data: &mut CreativeData, event: Option<&str>, offset: Option<&str>, text: &str) {
    match event {
        Some("progress") => {
            let Some(offset) = offset.and_then(parse_offset) else {
                debug!("Dropping progress pixel {:?} without a valid offset", text);
                return;
            };
            if let Some(url) = parse_url(text, "progress") {
                data.progress.push(ProgressMarker { url, offset });
            }
        }
        Some(name) => match TrackingEvent::from_name(name) {
            Some(event) => push_pixel(&mut data.pixels, event, text),
            None => debug!("Ignoring unsupported tracking event {:?}", name),
        },
        None => debug!("Ignoring Tracking element without an event"),
    }
}

/// Parse MediaFiles element
fn parse_media_files(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"MediaFile" => {
                let format = media_format(attribute(e, b"type").as_deref(), attribute(e, b"apiFramework").as_deref());
                let text = read_text_element(reader)?;
                match format {
                    Some(format) => {
                        if let Some(url) = parse_url(&text, "media file") {
                            data.media_files.push(MediaFile { url, format });
                        }
                    }
                    None => debug!("Ignoring media file with unsupported type: {}", text),
                }
            }
            Event::Start(ref e) => skip_element(reader, e.name().as_ref())?,
            Event::End(ref e) if e.name().as_ref() == b"MediaFiles" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Classify a media file by its declared MIME type and API framework
fn media_format(mime_type: Option<&str>, api_framework: Option<&str>) -> Option<MediaFormat> {
    let mime_type = mime_type?.trim().to_ascii_lowercase();
    let is_vpaid = api_framework.is_some_and(|framework| framework.trim().eq_ignore_ascii_case("VPAID"));

    match mime_type.as_str() {
        "application/javascript" | "application/x-javascript" | "text/javascript" if is_vpaid => Some(MediaFormat::Vpaid),
        "video/mp4" if !is_vpaid => Some(MediaFormat::Mp4),
        _ => None,
    }
}

/// Parse VideoClicks element
fn parse_video_clicks(reader: &mut XmlReader, data: &mut CreativeData) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"ClickThrough" => {
                    let text = read_text_element(reader)?;
                    if data.clickthrough.is_none() {
                        data.clickthrough = parse_url(&text, "click-through");
                    }
                }
                b"ClickTracking" => push_pixel(&mut data.pixels, TrackingEvent::ClickTracking, &read_text_element(reader)?),
                name => skip_element(reader, name)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"VideoClicks" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse AdVerifications element
fn parse_ad_verifications(reader: &mut XmlReader) -> Result<Vec<AdVerification>> {
    let mut verifications = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Verification" => {
                let vendor_key = attribute(e, b"vendor");
                if let Some(verification) = parse_verification(reader, vendor_key)? {
                    verifications.push(verification);
                }
            }
            Event::Start(ref e) => skip_element(reader, e.name().as_ref())?,
            Event::End(ref e) if e.name().as_ref() == b"AdVerifications" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(verifications)
}

/// Parse Verification element; entries without a JavaScriptResource are dropped
fn parse_verification(reader: &mut XmlReader, vendor_key: Option<String>) -> Result<Option<AdVerification>> {
    let mut javascript_resource = None;
    let mut verification_parameters = None;
    let mut verification_not_executed = None;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"JavaScriptResource" => {
                    let text = read_text_element(reader)?;
                    javascript_resource = javascript_resource.or_else(|| parse_url(&text, "verification script"));
                }
                b"VerificationParameters" => {
                    let text = read_text_element(reader)?;
                    verification_parameters = Url::parse(&text).ok();
                }
                b"TrackingEvents" => {
                    verification_not_executed = parse_verification_tracking(reader)?.or(verification_not_executed);
                }
                name => skip_element(reader, name)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Verification" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    let Some(javascript_resource) = javascript_resource else {
        debug!("Dropping verification {:?} without a JavaScriptResource", vendor_key);
        return Ok(None);
    };

    Ok(Some(AdVerification {
        vendor_key,
        javascript_resource,
        verification_parameters,
        verification_not_executed,
    }))
}

/// Find the verificationNotExecuted pixel inside a Verification's TrackingEvents
fn parse_verification_tracking(reader: &mut XmlReader) -> Result<Option<Url>> {
    let mut not_executed = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Tracking" => {
                let event = attribute(e, b"event");
                let text = read_text_element(reader)?;
                if not_executed.is_none() && event.as_deref() == Some("verificationNotExecuted") {
                    not_executed = parse_url(&text, "verificationNotExecuted");
                }
            }
            Event::Start(ref e) => skip_element(reader, e.name().as_ref())?,
            Event::End(ref e) if e.name().as_ref() == b"TrackingEvents" => break,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(not_executed)
}

/// Collect verifications from AdVerifications blocks nested anywhere in Extensions
fn parse_extensions(reader: &mut XmlReader) -> Result<Vec<AdVerification>> {
    let mut verifications = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"AdVerifications" => {
                verifications.extend(parse_ad_verifications(reader)?);
            }
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(VastError::UnexpectedEof),
            _ => (),
        }
        buf.clear();
    }

    Ok(verifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(xml: &str) -> Inline {
        match parse_vast(xml).unwrap() {
            Document::Inline(inline) => inline,
            other => panic!("expected inline, got {:?}", other),
        }
    }

    #[test]
    fn classifies_media_formats() {
        assert_eq!(media_format(Some("video/mp4"), None), Some(MediaFormat::Mp4));
        assert_eq!(media_format(Some("VIDEO/MP4"), None), Some(MediaFormat::Mp4));
        assert_eq!(media_format(Some("application/javascript"), Some("VPAID")), Some(MediaFormat::Vpaid));
        assert_eq!(media_format(Some("application/javascript"), None), None);
        assert_eq!(media_format(Some("video/webm"), None), None);
        assert_eq!(media_format(None, Some("VPAID")), None);
    }

    #[test]
    fn rejects_documents_without_vast_root() {
        assert!(matches!(parse_vast("<NotVAST></NotVAST>"), Err(VastError::MissingRoot)));
        assert!(matches!(parse_vast(""), Err(VastError::MissingRoot)));
    }

    #[test]
    fn rejects_documents_without_ads() {
        assert!(matches!(parse_vast(r#"<VAST version="3.0"></VAST>"#), Err(VastError::NoAd)));
        assert!(matches!(parse_vast(r#"<VAST version="3.0"/>"#), Err(VastError::NoAd)));
        assert!(matches!(
            parse_vast(r#"<VAST version="3.0"><Ad id="1"></Ad></VAST>"#),
            Err(VastError::NoAd)
        ));
    }

    #[test]
    fn wrapper_requires_tag_url() {
        let xml = r#"<VAST version="3.0"><Ad><Wrapper><Impression>http://a.com/i</Impression></Wrapper></Ad></VAST>"#;
        assert!(matches!(parse_vast(xml), Err(VastError::MissingField(_))));
    }

    #[test]
    fn wrapper_keeps_raw_tag_uri() {
        let xml = r#"<VAST version="3.0"><Ad><Wrapper>
            <VASTAdTagURI><![CDATA[ http%3A%2F%2FmyTrackingURL%2FadTagURL ]]></VASTAdTagURI>
        </Wrapper></Ad></VAST>"#;
        let Document::Wrapper(wrapper) = parse_vast(xml).unwrap() else {
            panic!("expected a wrapper");
        };
        assert_eq!(wrapper.tag_uri, "http%3A%2F%2FmyTrackingURL%2FadTagURL");
        assert_eq!(wrapper.decoded_tag_url(), "http://myTrackingURL/adTagURL");
        assert_eq!(wrapper.tag_url.as_str(), "http://mytrackingurl/adTagURL");
    }

    #[test]
    fn first_usable_ad_wins() {
        let xml = r#"<VAST version="3.0">
            <Ad id="empty"></Ad>
            <Ad id="first"><InLine></InLine></Ad>
            <Ad id="second"><Wrapper><VASTAdTagURI>http://b.com</VASTAdTagURI></Wrapper></Ad>
        </VAST>"#;
        assert_eq!(inline(xml).id.as_deref(), Some("first"));
    }

    #[test]
    fn text_and_cdata_parse_identically() {
        let plain = r#"<VAST version="3.0"><Ad><InLine><Impression>
            http://a.com/impression
        </Impression></InLine></Ad></VAST>"#;
        let cdata = r#"<VAST version="3.0"><Ad><InLine><Impression>
            <![CDATA[ http://a.com/impression ]]>
        </Impression></InLine></Ad></VAST>"#;
        assert_eq!(inline(plain).pixels, inline(cdata).pixels);
        assert_eq!(inline(plain).pixels.get(TrackingEvent::Impression).len(), 1);
    }

    #[test]
    fn progress_marker_with_bad_offset_is_dropped() {
        let xml = r#"<VAST version="3.0"><Ad><InLine><Creatives><Creative><Linear skipoffset="bogus">
            <TrackingEvents>
                <Tracking event="progress" offset="later">http://a.com/p1</Tracking>
                <Tracking event="progress" offset="00:00:05">http://a.com/p2</Tracking>
                <Tracking event="start">http://a.com/start</Tracking>
            </TrackingEvents>
        </Linear></Creative></Creatives></InLine></Ad></VAST>"#;
        let inline = inline(xml);
        assert_eq!(inline.skip_offset, None);
        assert_eq!(inline.progress.len(), 1);
        assert_eq!(inline.progress[0].offset, Offset::Time(5));
        assert_eq!(inline.pixels.get(TrackingEvent::Start).len(), 1);
    }

    #[test]
    fn nested_tracking_in_companions_is_collected() {
        let xml = r#"<VAST version="3.0"><Ad><InLine><Creatives>
            <Creative><CompanionAds><Companion><TrackingEvents>
                <Tracking event="creativeView">http://a.com/cv</Tracking>
            </TrackingEvents></Companion></CompanionAds></Creative>
        </Creatives></InLine></Ad></VAST>"#;
        assert_eq!(inline(xml).pixels.get(TrackingEvent::CreativeView).len(), 1);
    }
}
