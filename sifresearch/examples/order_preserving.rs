//! Example demonstrating order-preserving encryption of integers, dates and times.

use chrono::{NaiveDate, NaiveTime};
use secrecy::SecretVec;
use sifresearch::cipher_suite::CipherSuite;
use sifresearch::config::SuiteConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("SifreSearch Order-Preserving Encryption Example");
    println!("===============================================\n");

    let key = SecretVec::new(b"key goes here!!!".to_vec());
    let suite = CipherSuite::new(key, SuiteConfig::new(0, 2_097_152))?;
    println!("✓ Integer domain: {:?}\n", suite.int_domain());

    println!("Integers");
    println!("--------");
    for value in [1233, 1234, 1235] {
        println!("{value:>8} → {}", suite.encrypt_int(value)?);
    }

    println!("\nDates (day ordinals)");
    println!("--------------------");
    for (y, m, d) in [(2009, 12, 31), (2010, 1, 1), (2010, 1, 2)] {
        let date = NaiveDate::from_ymd_opt(y, m, d).ok_or("bad date")?;
        println!("{date} → {}", suite.encrypt_date(date)?);
    }

    println!("\nTimes (seconds of the day)");
    println!("--------------------------");
    for (h, m, s) in [(11, 12, 12), (11, 12, 13), (11, 12, 14)] {
        let time = NaiveTime::from_hms_opt(h, m, s).ok_or("bad time")?;
        println!("{time} → {}", suite.encrypt_time(time)?);
    }

    let ct = suite.encrypt_int(1234)?;
    assert_eq!(suite.decrypt_int(ct)?, 1234);
    println!("\n✓ Round-trip verification successful");
    println!("→ Ciphertexts keep plaintext order, so the engine can run range queries on them");

    Ok(())
}
