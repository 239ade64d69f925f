use super::*;
use crate::config::RuntimeOption;
use crate::dns::TYPE_A;
use crate::testutil::{self, FrameSpec, IpPair};
use std::ffi::CString;
use std::ptr;

fn a_query() -> Vec<u8> {
    FrameSpec::v4().build(&testutil::dns_query(0x0101, "www.example.test", TYPE_A, false))
}

#[test]
fn handle_administers_records_and_prefixes() {
    let fastpath = Fastpath::new(ResponderConfig::default());
    fastpath
        .insert_a("www.example.test", Ipv4Addr::new(93, 184, 216, 34), 300)
        .unwrap();
    fastpath
        .insert_aaaa("www.example.test", Ipv6Addr::LOCALHOST, 300)
        .unwrap();
    assert_eq!(fastpath.records().len(), 2);
    assert!(fastpath.insert_a("bad..name", Ipv4Addr::LOCALHOST, 1).is_err());

    assert!(fastpath.serve("198.51.100.0/24").unwrap());
    assert!(!fastpath.serve("198.51.100.7/24").unwrap());
    assert!(fastpath.serve("not a prefix").is_err());

    assert!(fastpath
        .remove_record("www.example.test", RecordType::Aaaa)
        .unwrap());
    assert!(!fastpath
        .remove_record("www.example.test", RecordType::Aaaa)
        .unwrap());
    assert_eq!(fastpath.records().len(), 1);
}

#[test]
fn process_window_reports_decapsulated_head() {
    let fastpath = Fastpath::new(ResponderConfig::default());
    fastpath
        .insert_a("www.example.test", Ipv4Addr::new(93, 184, 216, 34), 300)
        .unwrap();
    fastpath.serve("198.51.100.0/24").unwrap();

    let input = FrameSpec::v4()
        .tunnel(IpPair::v4(testutil::TUNNEL_SRC_V4, testutil::TUNNEL_DST_V4))
        .build(&testutil::dns_query(2, "www.example.test", TYPE_A, false));
    let mut window = testutil::window(&input, 64);
    let (mut head, mut len) = (0, input.len());
    let action = fastpath
        .process_window(&mut window, &mut head, &mut len)
        .unwrap();

    assert_eq!(action, Action::Transmit);
    assert_eq!(head, 20);
    assert_eq!(len, input.len() - 20 + 16);
    assert_eq!(&window[head + 12..head + 14], &[0x08, 0x00]);

    let (mut head, mut len) = (10, window.len());
    assert!(fastpath
        .process_window(&mut window, &mut head, &mut len)
        .is_err());
}

#[test]
fn c_abi_round_trip() {
    unsafe {
        let fastpath = FastpathNew(ptr::null());
        assert!(!fastpath.is_null());

        let name = CString::new("www.example.test").unwrap();
        let cidr = CString::new("198.51.100.0/24").unwrap();
        assert!(FastpathInsertA(fastpath, name.as_ptr(), [93, 184, 216, 34].as_ptr(), 300));
        assert!(FastpathAddServedPrefix(fastpath, cidr.as_ptr()));
        assert!(!FastpathInsertA(fastpath, ptr::null(), [1, 2, 3, 4].as_ptr(), 1));
        assert!(!FastpathInsertAaaa(fastpath, name.as_ptr(), ptr::null(), 1));

        let input = a_query();
        let mut window = testutil::window(&input, 64);
        let (mut head, mut len) = (0usize, input.len());
        let status = FastpathProcessFrame(
            fastpath,
            window.as_mut_ptr(),
            window.len(),
            &mut head,
            &mut len,
        );
        assert_eq!(status, Action::Transmit as i32);
        assert_eq!(len, input.len() + 16);

        let mut metrics = FastpathMetrics::default();
        assert!(FastpathCopyMetrics(fastpath, &mut metrics));
        assert_eq!(metrics.received, 1);
        assert_eq!(metrics.transmitted, 1);
        assert_eq!(metrics.time_count, 1);

        assert!(FastpathSetRuntimeOption(fastpath, RuntimeOption::DryRun as u32, 1));
        assert!(!FastpathSetRuntimeOption(fastpath, 16, 1));
        let mut window = testutil::window(&input, 64);
        let (mut head, mut len) = (0usize, input.len());
        let status = FastpathProcessFrame(
            fastpath,
            window.as_mut_ptr(),
            window.len(),
            &mut head,
            &mut len,
        );
        assert_eq!(status, Action::Pass as i32);
        assert_eq!(&window[..len], &input[..]);

        assert!(FastpathRemoveRecord(fastpath, name.as_ptr(), TYPE_A));
        assert!(!FastpathRemoveRecord(fastpath, name.as_ptr(), 16));

        FastpathResetMetrics(fastpath);
        assert!(FastpathCopyMetrics(fastpath, &mut metrics));
        assert_eq!(metrics.received, 0);

        FastpathFree(fastpath);
    }
}

#[test]
fn c_abi_rejects_bad_arguments() {
    unsafe {
        let mut window = [0u8; 64];
        let (mut head, mut len) = (0usize, 14usize);
        assert_eq!(
            FastpathProcessFrame(ptr::null_mut(), window.as_mut_ptr(), 64, &mut head, &mut len),
            -1
        );

        let fastpath = FastpathNew(&FastpathConfig::default());
        assert_eq!(
            FastpathProcessFrame(fastpath, ptr::null_mut(), 64, &mut head, &mut len),
            -2
        );
        assert_eq!(
            FastpathProcessFrame(fastpath, window.as_mut_ptr(), 64, ptr::null_mut(), &mut len),
            -3
        );
        let mut too_long = 65usize;
        assert_eq!(
            FastpathProcessFrame(fastpath, window.as_mut_ptr(), 64, &mut head, &mut too_long),
            -4
        );
        assert_eq!(too_long, 65);
        assert!(!FastpathCopyMetrics(fastpath, ptr::null_mut()));
        FastpathFree(fastpath);
        FastpathFree(ptr::null_mut());
    }
}

#[test]
fn c_abi_inserts_copy_address_octets() {
    unsafe {
        let fastpath = FastpathNew(ptr::null());
        let name = CString::new("dual.example.test").unwrap();
        let v6: Ipv6Addr = "2001:db8::53".parse().unwrap();
        assert!(FastpathInsertA(fastpath, name.as_ptr(), [192, 0, 2, 53].as_ptr(), 60));
        assert!(FastpathInsertAaaa(fastpath, name.as_ptr(), v6.octets().as_ptr(), 90));

        let records = (*fastpath).records();
        let a = records
            .get_a(&QueryKey::from_name("dual.example.test", RecordType::A).unwrap())
            .unwrap();
        let aaaa = records
            .get_aaaa(&QueryKey::from_name("dual.example.test", RecordType::Aaaa).unwrap())
            .unwrap();
        assert_eq!(a, ARecord { address: Ipv4Addr::new(192, 0, 2, 53), ttl: 60 });
        assert_eq!(aaaa, AaaaRecord { address: v6, ttl: 90 });

        FastpathFree(fastpath);
    }
}
