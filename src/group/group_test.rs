use bytes::Bytes;

use super::*;
use crate::crypto::secret::Secret;

const SUITES: [CipherSuite; 2] = [
    CipherSuite::P256_SHA256_AES128GCM,
    CipherSuite::X25519_SHA256_AES128GCM,
];

struct Identity {
    signing_key: SignaturePrivateKey,
    credential: Credential,
}

fn identity(suite: CipherSuite, name: &[u8]) -> Result<Identity> {
    let signing_key = SignaturePrivateKey::generate(suite.signature_scheme())?;
    let credential = Credential::basic(name.to_vec(), signing_key.public_key().clone());
    Ok(Identity {
        signing_key,
        credential,
    })
}

fn init_key_for(
    suite: CipherSuite,
    member: &Identity,
    id: &[u8],
) -> Result<(UserInitKey, DHPrivateKey)> {
    let dh_key = DHPrivateKey::generate(suite)?;
    let mut init_key = UserInitKey::new(id.to_vec(), member.credential.clone());
    init_key.add_init_key(dh_key.public_key());
    init_key.sign(&member.signing_key)?;
    Ok((init_key, dh_key))
}

/// Builds an n-member group the long way: the creator adds each member in
/// turn, every existing member applies the handshake, and the joiner
/// enters through its Welcome.
fn build_group(suite: CipherSuite, n: usize) -> Result<Vec<GroupState>> {
    let creator = identity(suite, b"member-0")?;
    let mut states = vec![GroupState::new(
        &b"test group"[..],
        suite,
        creator.signing_key.clone(),
        creator.credential.clone(),
    )?];

    for i in 1..n {
        let member = identity(suite, format!("member-{i}").as_bytes())?;
        let (init_key, dh_key) = init_key_for(suite, &member, format!("uik-{i}").as_bytes())?;

        let (welcome, handshake) = states[0].add(LeafIndex(i as u32), &init_key)?;
        for state in states.iter_mut().skip(1) {
            state.apply(&handshake)?;
        }

        let mut joiner =
            GroupState::from_welcome(&welcome, member.signing_key.clone(), init_key, dh_key)?;
        joiner.apply(&handshake)?;
        states.push(joiner);
    }

    Ok(states)
}

fn assert_converged(states: &[GroupState]) {
    let first = &states[0];
    for state in &states[1..] {
        assert_eq!(state.epoch(), first.epoch());
        assert_eq!(state.tree(), first.tree());
        assert_eq!(state.roster(), first.roster());
        assert_eq!(state.transcript_hash(), first.transcript_hash());
        assert_eq!(
            state.epoch_secrets().unwrap().application_secret(),
            first.epoch_secrets().unwrap().application_secret()
        );
    }
}

fn application_secret(state: &GroupState) -> Secret {
    state.epoch_secrets().unwrap().application_secret().clone()
}

#[test]
fn two_party_create_welcome_join() -> Result<()> {
    for suite in SUITES {
        let states = build_group(suite, 2)?;
        assert_eq!(states[0].epoch(), 1);
        assert_eq!(states[0].my_index(), Some(LeafIndex(0)));
        assert_eq!(states[1].my_index(), Some(LeafIndex(1)));
        assert_converged(&states);

        // The joiner holds the private key of its own leaf
        assert!(states[1]
            .tree()
            .leaf(LeafIndex(1))
            .unwrap()
            .private_key()
            .is_some());
    }
    Ok(())
}

#[test]
fn group_converges_through_add_update_remove() -> Result<()> {
    let suite = CipherSuite::P256_SHA256_AES128GCM;
    let mut states = build_group(suite, 4)?;
    let mut history = vec![application_secret(&states[0])];

    // Add a fifth member: the leaf layer grows and the new path is blank
    let newcomer = identity(suite, b"member-4")?;
    let (init_key, dh_key) = init_key_for(suite, &newcomer, b"uik-4")?;
    let (welcome, handshake) = states[0].add(LeafIndex(4), &init_key)?;
    for state in states.iter_mut().skip(1) {
        state.apply(&handshake)?;
    }
    let mut joiner =
        GroupState::from_welcome(&welcome, newcomer.signing_key.clone(), init_key, dh_key)?;
    joiner.apply(&handshake)?;
    states.push(joiner);

    assert_eq!(states[0].tree().size(), 9);
    assert_converged(&states);
    history.push(application_secret(&states[0]));

    // Update from member 0
    let handshake = states[0].update()?;
    for state in states.iter_mut().skip(1) {
        state.apply(&handshake)?;
    }
    assert_converged(&states);
    history.push(application_secret(&states[0]));

    // Remove member 2; the evicted member sees Removed and keeps its old
    // state
    let handshake = states[0].remove(LeafIndex(2))?;
    let epoch_before = states[2].epoch();
    assert!(matches!(states[2].apply(&handshake), Err(Error::Removed)));
    assert_eq!(states[2].epoch(), epoch_before);

    for (i, state) in states.iter_mut().enumerate().skip(1) {
        if i == 2 {
            continue;
        }
        state.apply(&handshake)?;
    }

    let survivors: Vec<&GroupState> = states
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 2)
        .map(|(_, s)| s)
        .collect();
    assert!(survivors[0].tree().leaf(LeafIndex(2)).unwrap().is_blank());
    assert!(survivors[0].roster().get(LeafIndex(2)).is_none());
    for window in survivors.windows(2) {
        assert_eq!(window[0].tree(), window[1].tree());
        assert_eq!(window[0].transcript_hash(), window[1].transcript_hash());
        assert_eq!(
            window[0].epoch_secrets().unwrap().application_secret(),
            window[1].epoch_secrets().unwrap().application_secret()
        );
    }
    history.push(application_secret(survivors[0]));

    // Every epoch rolled the application secret forward
    for i in 0..history.len() {
        for j in (i + 1)..history.len() {
            assert_ne!(history[i], history[j]);
        }
    }
    Ok(())
}

#[test]
fn blank_leaf_is_reusable_after_remove() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut states = build_group(suite, 3)?;

    let handshake = states[0].remove(LeafIndex(1))?;
    states[2].apply(&handshake)?;

    // The freed slot takes the next joiner in place
    let member = identity(suite, b"replacement")?;
    let (init_key, dh_key) = init_key_for(suite, &member, b"uik-replacement")?;
    let (welcome, handshake) = states[0].add(LeafIndex(1), &init_key)?;
    states[2].apply(&handshake)?;
    let mut joiner =
        GroupState::from_welcome(&welcome, member.signing_key.clone(), init_key, dh_key)?;
    joiner.apply(&handshake)?;

    assert_eq!(states[0].tree().size(), 5);
    assert_eq!(joiner.my_index(), Some(LeafIndex(1)));
    assert_eq!(joiner.tree(), states[0].tree());
    Ok(())
}

#[test]
fn tampered_confirmation_is_rejected_without_state_change() -> Result<()> {
    let mut states = build_group(CipherSuite::X25519_SHA256_AES128GCM, 2)?;

    let mut handshake = states[0].update()?;
    let mut confirmation = handshake.confirmation.to_vec();
    confirmation[0] ^= 0x01;
    handshake.confirmation = Bytes::from(confirmation);

    let before = states[1].serialize_detached()?;
    assert!(matches!(
        states[1].apply(&handshake),
        Err(Error::ConfirmationMismatch)
    ));
    assert_eq!(states[1].serialize_detached()?, before);

    // The untampered handshake still applies cleanly afterwards
    let mut confirmation = handshake.confirmation.to_vec();
    confirmation[0] ^= 0x01;
    handshake.confirmation = Bytes::from(confirmation);
    states[1].apply(&handshake)?;
    assert_eq!(states[1].epoch(), states[0].epoch());
    Ok(())
}

#[test]
fn tampered_signature_region_is_rejected() -> Result<()> {
    let mut states = build_group(CipherSuite::P256_SHA256_AES128GCM, 3)?;

    let mut handshake = states[0].update()?;
    // Claiming a different signer breaks the signature over
    // (prior_epoch, operation, signer_index)
    handshake.signer_index = LeafIndex(2);
    assert!(matches!(
        states[1].apply(&handshake),
        Err(Error::InvalidSignature)
    ));
    Ok(())
}

#[test]
fn wrong_epoch_is_rejected() -> Result<()> {
    let mut states = build_group(CipherSuite::X25519_SHA256_AES128GCM, 2)?;

    let handshake = states[0].update()?;
    states[1].apply(&handshake)?;
    assert!(matches!(
        states[1].apply(&handshake),
        Err(Error::WrongEpoch)
    ));
    Ok(())
}

#[test]
fn removed_member_is_left_behind() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut states = build_group(suite, 3)?;

    let remove = states[0].remove(LeafIndex(2))?;
    states[1].apply(&remove)?;
    assert!(matches!(states[2].apply(&remove), Err(Error::Removed)));

    // The survivors' next epoch is out of the removed member's reach
    let update = states[0].update()?;
    states[1].apply(&update)?;
    assert!(matches!(states[2].apply(&update), Err(Error::WrongEpoch)));

    assert_ne!(
        application_secret(&states[0]),
        application_secret(&states[2])
    );
    Ok(())
}

#[test]
fn preliminary_state_waits_for_its_add() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let mut states = build_group(suite, 2)?;

    let member = identity(suite, b"member-2")?;
    let (init_key, dh_key) = init_key_for(suite, &member, b"uik-2")?;
    let (welcome, handshake) = states[0].add(LeafIndex(2), &init_key)?;

    let mut joiner =
        GroupState::from_welcome(&welcome, member.signing_key.clone(), init_key, dh_key)?;
    assert_eq!(joiner.my_index(), None);
    assert!(matches!(joiner.update(), Err(Error::PreliminaryGroupState)));

    joiner.apply(&handshake)?;
    assert_eq!(joiner.my_index(), Some(LeafIndex(2)));

    states[1].apply(&handshake)?;
    assert_eq!(joiner.tree(), states[1].tree());
    Ok(())
}

#[test]
fn group_state_requires_matching_credential() -> Result<()> {
    let suite = CipherSuite::X25519_SHA256_AES128GCM;
    let member = identity(suite, b"me")?;
    let stranger = identity(suite, b"stranger")?;

    assert!(matches!(
        GroupState::new(
            &b"group"[..],
            suite,
            member.signing_key.clone(),
            stranger.credential,
        ),
        Err(Error::CredentialKeyMismatch)
    ));
    Ok(())
}
