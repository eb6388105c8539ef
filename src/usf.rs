use crate::adpcm::{decode_adpcm, encode_adpcm, SampleWidth};
use crate::sound::{read_record, Result, SoundError};
use crate::wav::{Sound, WaveFormat, WaveWriteOptions};
use binread::BinRead;
use binwrite::BinWrite;
use log::{debug, warn};
use num::ToPrimitive;

pub(crate) const USF_MAGIC: [u8; 4] = *b"UGSF";
const NAME_LEN: usize = 32;
/// Sample count meaning "the whole payload"
const ALL_SAMPLES: u32 = 0xFFFF_FFFF;

/// Size = 0xB
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
struct UsfInfo {
    adpcm: u8,
    bits_per_sample: u8,
    channels: u8,
    samples_per_sec: u16,
    loop_count: u16,
    num_samples: u32,
}

const INFO_SIZE: usize = 0xB;

pub(crate) fn read_usf(data: &[u8]) -> Result<Sound> {
    if data.len() < 5 {
        return Err(SoundError::Truncated("USF header"));
    }
    if data[0..4] != USF_MAGIC {
        return Err(SoundError::BadImage("not a USF image".to_owned()));
    }
    let (name, info_offset) = match data[4] {
        0 => (String::new(), 5),
        1 => {
            let raw = data
                .get(5..5 + NAME_LEN)
                .ok_or(SoundError::Truncated("USF name"))?;
            let end = raw.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
            (String::from_utf8_lossy(&raw[..end]).into_owned(), 5 + NAME_LEN)
        }
        version => return Err(SoundError::Unsupported(format!("USF version {}", version))),
    };
    let info: UsfInfo = read_record(data, info_offset, INFO_SIZE, "USF info")?;
    let width = SampleWidth::from_bits(info.bits_per_sample as u16)
        .filter(|w| *w != SampleWidth::I32)
        .ok_or_else(|| {
            SoundError::Unsupported(format!("{}-bit USF samples", info.bits_per_sample))
        })?;
    if !(1..=2).contains(&info.channels) {
        return Err(SoundError::Unsupported(format!("{} USF channels", info.channels)));
    }

    let payload = &data[info_offset + INFO_SIZE..];
    let mut samples = if info.adpcm != 0 {
        decode_adpcm(payload, width)
    } else {
        payload.to_vec()
    };
    if info.num_samples != ALL_SAMPLES {
        let wanted = info.num_samples as usize * width.bytes();
        if wanted > samples.len() {
            warn!(
                "USF declares {} samples but holds only {} bytes",
                info.num_samples,
                samples.len()
            );
        }
        samples.truncate(wanted);
    }
    debug!(
        "Read USF \"{}\": {} bytes, adpcm {}",
        name,
        samples.len(),
        info.adpcm != 0
    );

    Ok(Sound {
        format: WaveFormat::pcm(
            info.channels as u16,
            info.samples_per_sec as u32,
            info.bits_per_sample as u16,
        ),
        data: samples,
        name,
    })
}

pub(crate) fn write_usf(sound: &Sound, options: &WaveWriteOptions) -> Result<Vec<u8>> {
    let format = &sound.format;
    let width = SampleWidth::from_bits(format.bits_per_sample)
        .filter(|w| *w != SampleWidth::I32)
        .ok_or_else(|| {
            SoundError::Unsupported(format!("{}-bit USF samples", format.bits_per_sample))
        })?;
    let samples_per_sec = format.samples_per_sec.to_u16().ok_or_else(|| {
        SoundError::Unsupported(format!("{} Hz in a USF image", format.samples_per_sec))
    })?;
    let channels = format
        .channels
        .to_u8()
        .ok_or_else(|| SoundError::Unsupported(format!("{} channels", format.channels)))?;

    let pcm = if sound.data.is_empty() {
        format.silence()
    } else {
        sound.data.clone()
    };
    let encoded = if options.force_pcm {
        None
    } else {
        Some(encode_adpcm(&pcm, width)).filter(|e| !e.is_empty() && e.len() < pcm.len())
    };

    let mut buf = Vec::with_capacity(5 + NAME_LEN + INFO_SIZE + pcm.len());
    buf.extend_from_slice(&USF_MAGIC);
    buf.push(1);
    let mut name = [0u8; NAME_LEN];
    let name_len = sound.name.len().min(NAME_LEN);
    name[..name_len].copy_from_slice(&sound.name.as_bytes()[..name_len]);
    buf.extend_from_slice(&name);
    UsfInfo {
        adpcm: encoded.is_some() as u8,
        bits_per_sample: format.bits_per_sample as u8,
        channels,
        samples_per_sec,
        loop_count: 1,
        num_samples: ALL_SAMPLES,
    }
    .write(&mut buf)?;
    buf.extend_from_slice(encoded.as_ref().unwrap_or(&pcm));
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usf(version: u8, name: &str, info: UsfInfo, payload: &[u8]) -> Vec<u8> {
        let mut out = b"UGSF".to_vec();
        out.push(version);
        if version == 1 {
            let mut raw = [0u8; NAME_LEN];
            raw[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&raw);
        }
        info.write(&mut out).unwrap();
        out.extend_from_slice(payload);
        out
    }

    fn info(adpcm: u8, bits: u8, num_samples: u32) -> UsfInfo {
        UsfInfo {
            adpcm,
            bits_per_sample: bits,
            channels: 1,
            samples_per_sec: 11025,
            loop_count: 1,
            num_samples,
        }
    }

    #[test]
    fn write_layout() {
        let mut sound = Sound::new(WaveFormat::default(), vec![128; 100]);
        sound.name = "purr".to_owned();
        let data = write_usf(&sound, &WaveWriteOptions::default()).unwrap();
        assert_eq!(data.len(), 5 + 32 + 11 + 50);
        assert_eq!(&data[0..5], b"UGSF\x01");
        assert_eq!(&data[5..10], b"purr\0");
        assert_eq!(data[37], 1);
        assert_eq!(data[38], 8);
        assert_eq!(data[39], 1);
        assert_eq!(&data[40..42], &11025u16.to_le_bytes());
        assert_eq!(&data[42..44], &1u16.to_le_bytes());
        assert_eq!(&data[44..48], &[0xFF; 4]);
        assert!(data[48..].iter().all(|b| *b == 0));
    }

    #[test]
    fn adpcm_round_trip_of_silence() {
        let mut sound = Sound::new(WaveFormat::default(), vec![128; 100]);
        sound.name = "purr".to_owned();
        let data = write_usf(&sound, &WaveWriteOptions::default()).unwrap();
        assert_eq!(read_usf(&data).unwrap(), sound);
    }

    #[test]
    fn force_pcm_keeps_samples() {
        let sound = Sound::new(WaveFormat::pcm(1, 11025, 16), (0..40).collect());
        let options = WaveWriteOptions {
            force_pcm: true,
            ..Default::default()
        };
        let data = write_usf(&sound, &options).unwrap();
        assert_eq!(data[37], 0);
        assert_eq!(read_usf(&data).unwrap(), sound);
    }

    #[test]
    fn incompressible_data_stays_pcm() {
        let sound = Sound::new(WaveFormat::default(), vec![128]);
        let data = write_usf(&sound, &WaveWriteOptions::default()).unwrap();
        assert_eq!(data[37], 0);
        assert_eq!(&data[48..], &[128]);
    }

    #[test]
    fn version_zero_and_sample_count() {
        let data = usf(0, "", info(0, 8, 3), &[10, 20, 30, 40, 50]);
        let sound = read_usf(&data).unwrap();
        assert_eq!(sound.name, "");
        assert_eq!(sound.data, vec![10, 20, 30]);
        assert!(sound.is_pleo_native());

        let data = usf(1, "chirp", info(1, 8, ALL_SAMPLES), &[0x07, 0xF2]);
        let sound = read_usf(&data).unwrap();
        assert_eq!(sound.name, "chirp");
        assert_eq!(sound.data, vec![128, 139, 109, 130]);
    }

    #[test]
    fn rejects_bad_images() {
        assert!(matches!(read_usf(b"UGSF"), Err(SoundError::Truncated(_))));
        assert!(matches!(
            read_usf(&usf(2, "", info(0, 8, ALL_SAMPLES), &[])),
            Err(SoundError::Unsupported(_))
        ));
        assert!(matches!(
            read_usf(&usf(0, "", info(0, 12, ALL_SAMPLES), &[])),
            Err(SoundError::Unsupported(_))
        ));
        assert!(matches!(
            read_usf(b"UGSF\x01short-name"),
            Err(SoundError::Truncated(_))
        ));
        assert!(matches!(
            read_usf(b"UGMF\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"),
            Err(SoundError::BadImage(_))
        ));
        let high_rate = Sound::new(WaveFormat::pcm(1, 96000, 8), vec![1, 2, 3, 4]);
        assert!(matches!(
            write_usf(&high_rate, &WaveWriteOptions::default()),
            Err(SoundError::Unsupported(_))
        ));
    }
}
