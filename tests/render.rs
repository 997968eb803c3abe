use zxtune::devices::sound::BufferReceiver;
use zxtune::formats::Container;
use zxtune::{export_to_wav, render, Registry, RenderParameters};

fn psg(frames: usize) -> Vec<u8> {
    let mut data = b"PSG\x1a\x00\x32".to_vec();
    data.resize(16, 0);
    for _ in 0..frames {
        data.extend_from_slice(&[0xFF, 0, 0x80, 7, 0x3E, 8, 0x0F]);
    }
    data.push(0xFD);
    data
}

#[test]
fn test_render_stops_at_module_end() {
    let registry = Registry::default();
    let mut module = registry.create(&Container::new(psg(6))).unwrap();
    let mut out = BufferReceiver::default();
    let frames = render(&mut module, &RenderParameters::default(), &mut out, None);
    assert_eq!(frames, 6);
    assert!(out.ticks > 0);
}

#[test]
fn test_render_honours_frame_limit() {
    let registry = Registry::default();
    let mut module = registry.create(&Container::new(psg(20))).unwrap();
    let mut out = BufferReceiver::default();
    let frames = render(&mut module, &RenderParameters::default(), &mut out, Some(3));
    assert_eq!(frames, 3);
    assert!(out.flushed);
}

#[test]
fn test_export_to_wav() -> anyhow::Result<()> {
    let registry = Registry::default();
    let mut module = registry.create(&Container::new(psg(4)))?;
    let params = RenderParameters {
        sound_freq: 8000,
        ..RenderParameters::default()
    };
    let file = std::env::temp_dir().join(format!("zxtune-export-{}.wav", std::process::id()));
    let frames = export_to_wav(&mut module, &params, &file, None)?;
    let reader = hound::WavReader::open(&file)?;
    let spec = reader.spec();
    let samples = reader.len();
    std::fs::remove_file(&file)?;

    assert_eq!(frames, 4);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);
    assert!(samples > 0);
    assert_eq!(samples % 2, 0);
    Ok(())
}
